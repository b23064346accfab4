//! chatq worker - admission control and queue plumbing around the session loop
//!
//! - [`dispatcher`]: runs actions only while the loop listens, retries otherwise
//! - [`queue`]: in-process named queues with delayed delivery and a result store
//! - [`step`]: worker start/stop, wiring credentials, extensions and the session
//! - [`worker`]: queue consumers
//! - [`config`]: credentials and JSON worker configuration

pub mod action;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod logging;
pub mod queue;
pub mod step;
pub mod worker;

pub use action::{Action, ActionOutput, TaskEnvelope, TaskId};
pub use config::{Credentials, WorkerConfig};
pub use dispatcher::{DispatchMode, Dispatcher, RetryPolicy, Scheduler, TaskOutcome};
pub use queue::{ResultStore, TaskQueue, TaskState};
pub use step::{StartOptions, WorkerStep};
pub use worker::Worker;
