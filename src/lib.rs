//! # task_decomposer
//!
//! Recursive hierarchical task decomposition with bounded depth and fan-out.
//!
//! A request enters the `RecursiveSolver` as a root task. The solver either
//! executes it directly through an atomic executor, or has it planned into
//! subtasks, solves each subtask one level deeper, and aggregates the results.
//!
//! ## Architecture
//!
//! ```text
//!   TaskRequest
//!       │
//!       ▼
//!   ┌──────────┐  atomic   ┌──────────────────┐
//!   │ Atomizer ├──────────►│ ExecutorRegistry │──► ResultEnvelope
//!   └────┬─────┘           └──────────────────┘
//!        │ complex
//!        ▼
//!   ┌─────────┐   ┌──────────────────┐   ┌────────────┐
//!   │ Planner ├──►│ SubtaskScheduler ├──►│ Aggregator │──► ResultEnvelope
//!   └─────────┘   └────────┬─────────┘   └────────────┘
//!                          │ depth + 1
//!                          ▼
//!                  RecursiveSolver
//! ```
//!
//! ## Modules
//! - `agents`: the solver, its components and the health executors
//! - `task`: tasks, plans and the result envelope
//! - `provider`: the capability provider seam (LLM-backed or offline)
//! - `llm`: OpenRouter client with retry and failover
//! - `storage`: report persistence
//! - `service`: health workflows

pub mod agents;
pub mod config;
pub mod llm;
pub mod provider;
pub mod service;
pub mod storage;
pub mod task;

pub use agents::{RecursiveSolver, SystemInfo};
pub use config::Config;
pub use service::HealthService;
pub use task::{ResultEnvelope, TaskRequest};
