//! # Strata Compiler
//!
//! Compilation facade over [`strata_sql`]: a [`Compiler`] owns the catalog
//! and the stage pipeline, plans each query on its cheapest stage, and
//! publishes the result as a table that later queries scan. Constraints a
//! query leaves pending travel with its table as pull-ups.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strata_compiler::{Compiler, CompilerConfig};
//!
//! let config = CompilerConfig::from_file("strata.toml")?;
//! let mut compiler = Compiler::builder().config(config).table(events).build()?;
//! let recent = compiler.scan("events")?.filter(last_hour);
//! let compiled = compiler.compile("recent_events", &recent)?;
//! println!("{}", compiled.manifest.to_json()?);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]

pub mod builder;
pub mod compiler;
pub mod config;
pub mod error;
pub mod profile;

pub use builder::CompilerBuilder;
pub use compiler::{CompiledQuery, Compiler};
pub use config::CompilerConfig;
pub use error::CompilerError;
pub use profile::{PipelineProfile, ProfileError};

/// Result type for compiler operations.
pub type Result<T> = std::result::Result<T, CompilerError>;
