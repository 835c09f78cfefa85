//! Shared utilities

pub mod archive;
pub mod config;
pub mod context;
pub mod diagnostic;
pub mod fs;
pub mod process;
pub mod ssh;
pub mod tag;

pub use config::Config;
pub use context::GlobalContext;
pub use diagnostic::Diagnostic;
