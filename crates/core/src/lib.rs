//! Core library for the DSA Notes Agent
//!
//! This crate contains the pieces shared by the server and the chat client:
//! - Environment configuration
//! - Tool gateway URL construction
//! - Run configuration and user identity
//! - Run events and their client-facing records

pub mod config;
pub mod error;
pub mod model;
pub mod run;
pub mod tool_url;
pub mod user_id;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
