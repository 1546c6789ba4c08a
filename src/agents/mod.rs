//! Agents module - recursive task decomposition.
//!
//! # Components
//! - **Atomizer**: decides whether a task runs directly or gets decomposed
//! - **Planner**: turns a complex task into a validated plan of subtasks
//! - **SubtaskScheduler**: runs a plan's subtasks with dependency propagation
//! - **Aggregator**: combines subtask envelopes into one composed envelope
//! - **RecursiveSolver**: the state machine tying the above together
//! - **ExecutorRegistry**: routes atomic tasks to domain executors
//!
//! # Design Principles
//! - Every solve terminates: depth and fan-out are capped by `SolverLimits`
//! - Every solve returns an envelope; errors degrade, they never escape
//! - Provider calls are bounded by a deadline and the request's cancel token

mod context;
mod registry;
mod types;

pub mod aggregator;
pub mod atomizer;
pub mod executors;
pub mod orchestrator;
pub mod planner;

pub use aggregator::{Aggregator, Synthesizer};
pub use atomizer::{Atomizer, Classification, Decision, DecisionReason};
pub use context::SolveContext;
pub use orchestrator::{RecursiveSolver, SystemInfo};
pub use planner::{FallbackPlan, Planner};
pub use registry::{ExecutorRef, ExecutorRegistry, MatchedBy, Route};
pub use types::{AtomicExecutor, ExecutorError, ExecutorPayload};
