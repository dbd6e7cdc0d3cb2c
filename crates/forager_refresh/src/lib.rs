//! Agent configuration polling for Forager.
//!
//! This crate provides:
//! - The [`ConfigSource`] abstraction and a file-backed [`FileSource`]
//! - A [`Refresher`] that polls a source and installs the parsed policy
//! - A [`RefresherHandle`] for clean shutdown of the background task
//!
//! # Example
//!
//! ```rust,ignore
//! use forager_refresh::{FileSource, Refresher, RefresherConfig};
//! use forager_sampler::SamplingManager;
//! use std::sync::Arc;
//!
//! let manager = Arc::new(SamplingManager::new());
//! let source = FileSource::new(forager_refresh::default_settings_path());
//! let handle = Refresher::new(Arc::clone(&manager), source, RefresherConfig::new("shop")).spawn();
//! // ... serve requests ...
//! handle.shutdown().await;
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod error;
pub mod refresher;
pub mod source;

pub use error::{Error, Result};
pub use refresher::{
    RefreshOutcome, RefreshStats, Refresher, RefresherConfig, RefresherHandle,
    DEFAULT_POLL_INTERVAL,
};
pub use source::{default_settings_path, ConfigSource, FileSource};
