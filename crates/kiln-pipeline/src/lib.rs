//! Kiln Pipeline Library
//!
//! Front-end asset pipeline: declared tasks, their dependency graph and the
//! transforms they run.
//!
//! # Modules
//!
//! - [`task`] - Task contract, context and reports
//! - [`graph`] - Dependency graph with deterministic topological order
//! - [`registry`] - Declared tasks and derived sequences
//! - [`build`] - Sequence execution
//! - [`sources`] - Glob-selected source files
//! - [`output`] - Build root management
//! - [`assets`] - Pass-through copies
//! - [`fonts`] - TrueType/OpenType to WOFF2
//! - [`template`] - Indentation-based page templates
//! - [`template_lint`] - Template linting
//! - [`bem`] - BEM class naming checks
//! - [`pages`] - Template lint and render tasks
//! - [`styles`] - SCSS compilation and minification
//! - [`scripts`] - Script linting and minification
//! - [`images`] - Image optimization
//! - [`image_cache`] - Optimized image cache
//! - [`sprite`] - SVG stack sprite

pub mod assets;
pub mod bem;
pub mod build;
pub mod fonts;
pub mod graph;
pub mod image_cache;
pub mod images;
pub mod output;
pub mod pages;
pub mod registry;
pub mod scripts;
pub mod sources;
pub mod sprite;
pub mod styles;
pub mod task;
pub mod template;
pub mod template_lint;

pub use build::{BuildStats, Pipeline, PipelineError};
pub use registry::{RegistryError, TaskRegistry};
pub use sources::SourceSet;
pub use task::{Task, TaskContext, TaskError, TaskReport};
pub use template::TemplateContext;
