//! Host Process Control
//!
//! Some connection styles live only in a file the host application keeps
//! open. Editing them means saving, closing the host, waiting for the file
//! lock to clear, patching the file and reopening it. The OS-specific parts
//! sit behind [`HostPlatform`].

pub mod controller;
pub mod platform;

pub use controller::{ProcessController, ProcessOptions, WorkflowOptions, WorkflowResult, WorkflowStep};
pub use platform::{HostPlatform, SystemPlatform};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Command '{program}' failed: {message}")]
    Command { program: String, message: String },

    #[error("No input injector available: {0}")]
    NoInjector(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Join(String),
}
