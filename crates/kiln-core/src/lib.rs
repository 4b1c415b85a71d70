//! Kiln Core Library
//!
//! Configuration, build mode, lint diagnostics and error handling shared by the
//! Kiln asset pipeline and its command-line front end.

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod livereload;
pub mod mode;

pub use config::Config;
pub use diagnostic::{Diagnostic, RuleSet, Severity};
pub use error::{CoreError, Result};
pub use mode::BuildMode;
