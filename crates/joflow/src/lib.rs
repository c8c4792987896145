pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod workflow;

pub use config::{load_config, Config, RetryConfig};
pub use db::{Database, DatabaseError, RetryPolicy};
pub use error::{ConfigError, JoflowError, Result};
pub use notify::{DbNotifier, NoopNotifier, NotificationSink};
pub use workflow::{
    Category, NewRequest, RequestDetail, RequestStatus, Stage, StepStatus, WorkflowEngine,
    WorkflowError,
};
