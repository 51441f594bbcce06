#![warn(clippy::uninlined_format_args)]

pub mod cli;
pub mod error;
pub mod form;
pub mod llm;
pub mod model;
pub mod paths;
pub mod persistence;
pub mod runner;
pub mod status_export;
pub mod submit;

pub use cli::{Cli, Commands};
pub use error::{Error, Result};
