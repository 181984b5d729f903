//! Declarative agent pipeline runner.
//!
//! An agent definition is a named pipeline of typed steps (LLM calls, HTTP
//! calls, function calls) over a layered variable namespace. The
//! [`engine::Engine`] runs it against a runtime input, rendering every step
//! field through [`template`] and resolving credentials through [`secrets`].

pub mod agent;
pub mod cli;
pub mod config;
pub mod engine;
pub mod env;
pub mod error;
pub mod http;
pub mod logging;
pub mod providers;
pub mod secrets;
pub mod template;

pub use agent::AgentDefinition;
pub use engine::{Engine, ExecutionContext};
pub use error::{ExecutionError, StepError};
