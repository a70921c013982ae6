//! Command parsing and execution for the `tagsync` binary.

pub mod command;
pub mod error;
pub mod run;

pub use command::{Cli, Command};
pub use error::CliError;
