//! Orchestration: the recursive solver and the subtask scheduler it drives.

mod scheduler;
mod solver;

pub use scheduler::{SubtaskRunner, SubtaskScheduler};
pub use solver::{RecursiveSolver, SystemInfo, SAFETY_FEATURES};
