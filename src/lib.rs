//! localcut - in-process media processing engine
//!
//! This is the main library entry point that exposes all modules.
//! A host builds one [`MediaEngine`] from an [`EngineConfig`] and hands it
//! source files plus a typed [`Operation`]; the engine downloads and caches
//! the toolkit on first use, runs the job and returns the produced files.

// Module declarations
pub mod assets;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod media;
pub mod progress;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use catalog::Operation;
pub use config::{AssetSpec, EngineConfig};
pub use engine::{Engine, EngineStatus};
pub use error::{EngineError, ErrorPayload, Result};
pub use media::MediaInfo;
pub use progress::ProgressEvent;
pub use service::MediaEngine;
pub use types::*;
