//! The DSA notes agent: prompts, backends and per-request wiring

mod factory;
mod monitor;
mod prompt;

pub use factory::{AgentBackends, DsaAgent, AGENT_NAME, NUM_HISTORY_RUNS};
pub use monitor::timed;
pub use prompt::{AGENT_DESCRIPTION, AGENT_INSTRUCTION};
