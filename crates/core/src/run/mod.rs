//! Agent runs: per-run configuration, upstream events and client records

mod config;
pub mod event;
pub mod record;

pub use config::{RunConfig, ToolCredentials};
pub use event::{RunEvent, RunEventKind, ToolExecution};
pub use record::{translate, EventRecord, RecordKind};
