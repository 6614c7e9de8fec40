#![forbid(unsafe_code)]

//! Intent broker turning utterances addressed to simulated characters into
//! behavior directives, using an external long-running inference runner.

pub mod audit;
pub mod config;
pub mod errors;
pub mod manager;
pub mod models;
pub mod parser;
pub mod protocol;
pub mod queue;
pub mod runner;
pub mod worker;

pub use config::{IntentSettings, RunnerConfig};
pub use errors::{IntentError, Result};
pub use manager::{ContextBuilder, DirectiveSink, IntentManager};
