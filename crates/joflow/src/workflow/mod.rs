//! Routing workflow engine.
//!
//! Tracks an ordered chain of approval steps for a job-order request,
//! advancing a pointer through a fixed sequence of roles. The step with
//! status `Processing` is the authoritative current stage; the parent
//! request additionally carries an explicit `current_stage` pointer,
//! updated in the same transaction as every step change.

pub mod engine;
pub mod stage;
pub mod status;

pub use engine::{NewRequest, RequestDetail, WorkflowEngine, WorkflowError};
pub use stage::{AdvanceRule, NextActor, RejectRule, Stage};
pub use status::{Category, RequestStatus, StepStatus};
