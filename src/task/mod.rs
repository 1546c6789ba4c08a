//! Task module - defines tasks, plans and the uniform result envelope.
//!
//! - `Task`: the unit of work handed to the solver
//! - `Plan`: an ordered, dependency-annotated set of subtasks for one complex task
//! - `ResultEnvelope`: the success/failure/payload shape returned at every level

pub mod task;
mod plan;
mod envelope;

pub use task::{DataShape, Task, TaskId, TaskRequest, UNKNOWN_KIND};
pub use plan::{
    Plan, PlanError, PlanSource, RawPlan, RawSubtask, SubtaskSpec, AUTO_ID_PREFIX,
    DEFAULT_PRIORITY,
};
pub use envelope::ResultEnvelope;
