//! # Scheduler
//!
//! Least-time-left selection over the task table.
//!
//! ## Scheduling Policy
//!
//! Every live task carries a countdown, `time_left`, reset to its
//! `deadline` whenever it starts a new period (creation, voluntary yield,
//! deadline update). The scheduler picks the READY or
//! RUNNING task with the smallest `time_left`, i.e. the one closest to
//! the end of its period; ties go to the lowest slot index.
//!
//! This is not EDF over absolute deadlines. It approximates EDF only while
//! the periods of all tasks are kept in step by the resets above.
//!
//! ## Tick
//!
//! At each SysTick only the running task's countdown moves, by one unit,
//! saturating at zero. The caller asks for a switch when the countdown
//! reaches zero or the running task is overtaken. READY tasks keep their
//! `time_left` until they next run.

use crate::task::{TaskControlBlock, TaskTable};

/// Slot of the most urgent schedulable task, if any.
///
/// Pure: reads the table, changes nothing.
pub fn select(tasks: &[TaskControlBlock]) -> Option<usize> {
    tasks
        .iter()
        .enumerate()
        .filter(|(_, tcb)| tcb.is_schedulable())
        .min_by_key(|&(slot, tcb)| (tcb.time_left, slot))
        .map(|(slot, _)| slot)
}

/// Count the running task down by one tick.
///
/// Returns `true` on the tick that brings its `time_left` to zero.
pub fn elapse(tasks: &mut TaskTable, running: usize) -> bool {
    let current = tasks.slot_mut(running);
    if !current.is_schedulable() || current.time_left == 0 {
        return false;
    }
    current.time_left -= 1;
    current.time_left == 0
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_TASKS;
    use crate::task::{TaskId, TaskState};

    fn table(entries: &[(usize, TaskState, u32)]) -> [TaskControlBlock; MAX_TASKS] {
        let mut tasks = [TaskControlBlock::EMPTY; MAX_TASKS];
        for &(slot, state, time_left) in entries {
            tasks[slot].id = TaskId::from_slot(slot);
            tasks[slot].state = state;
            tasks[slot].deadline = time_left;
            tasks[slot].time_left = time_left;
        }
        tasks
    }

    #[test]
    fn test_picks_smallest_time_left() {
        let tasks = table(&[
            (1, TaskState::Ready, 5),
            (2, TaskState::Ready, 3),
            (3, TaskState::Running, 4),
        ]);
        assert_eq!(select(&tasks), Some(2));
    }

    #[test]
    fn test_ties_go_to_lowest_slot() {
        let tasks = table(&[
            (4, TaskState::Ready, 3),
            (2, TaskState::Running, 3),
            (7, TaskState::Ready, 3),
        ]);
        assert_eq!(select(&tasks), Some(2));
    }

    #[test]
    fn test_skips_dormant_sleeping_and_unused() {
        let mut tasks = table(&[
            (1, TaskState::Dormant, 1),
            (2, TaskState::Sleeping, 1),
            (5, TaskState::Ready, 9),
        ]);
        // Ready but identity cleared: an unused slot.
        tasks[3].state = TaskState::Ready;
        tasks[3].time_left = 0;
        assert_eq!(select(&tasks), Some(5));
    }

    #[test]
    fn test_reserved_slot_never_selected() {
        let mut tasks = table(&[]);
        tasks[0].state = TaskState::Running;
        tasks[0].time_left = 0;
        assert_eq!(select(&tasks), None);
    }

    fn task_table(entries: &[(usize, TaskState, u32)]) -> TaskTable {
        let mut tasks = TaskTable::new();
        for &(slot, state, time_left) in entries {
            let tcb = TaskControlBlock {
                id: TaskId::from_slot(slot),
                state,
                deadline: time_left,
                time_left,
                ..TaskControlBlock::EMPTY
            };
            tasks.install(slot, tcb, 0);
        }
        tasks
    }

    #[test]
    fn test_elapse_moves_only_the_running_task() {
        let mut tasks = task_table(&[(1, TaskState::Running, 5), (2, TaskState::Ready, 9)]);
        assert!(!elapse(&mut tasks, 1));
        assert_eq!(tasks.slot(1).time_left, 4);
        assert_eq!(tasks.slot(2).time_left, 9);
    }

    #[test]
    fn test_elapse_reports_reaching_zero_once() {
        let mut tasks = task_table(&[(1, TaskState::Running, 2)]);
        assert!(!elapse(&mut tasks, 1));
        assert!(elapse(&mut tasks, 1));
        assert_eq!(tasks.slot(1).time_left, 0);
        // Saturated: no further countdown and no repeat report.
        assert!(!elapse(&mut tasks, 1));
        assert_eq!(tasks.slot(1).time_left, 0);
        assert_eq!(tasks.slot(1).deadline, 2);
    }

    #[test]
    fn test_elapse_ignores_idle() {
        let mut tasks = task_table(&[(3, TaskState::Ready, 4)]);
        tasks.slot_mut(0).time_left = 7;
        assert!(!elapse(&mut tasks, 0));
        assert_eq!(tasks.slot(0).time_left, 7);
        assert_eq!(tasks.slot(3).time_left, 4);
    }

    #[test]
    fn test_select_is_pure() {
        let tasks = table(&[(1, TaskState::Ready, 2), (2, TaskState::Running, 8)]);
        let before: Vec<_> = tasks.iter().map(|t| (t.state, t.time_left)).collect();
        select(&tasks);
        let after: Vec<_> = tasks.iter().map(|t| (t.state, t.time_left)).collect();
        assert_eq!(before, after);
    }
}
