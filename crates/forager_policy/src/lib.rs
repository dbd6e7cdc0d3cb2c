//! Sampling policy model and agent configuration parsing for Forager.
//!
//! This crate provides:
//! - An immutable [`Policy`]: a default [`Rate`] plus per-key [`Override`]s
//! - Request key normalization and override [`KeyPattern`]s
//! - Parsing of the agent configuration document for one site
//!
//! # Example
//!
//! ```rust
//! use forager_policy::{normalize_key, parse};
//!
//! let input = r#"{
//!   "sites": [{
//!     "identifier": "shop",
//!     "defaultRate": { "maxPerInterval": 5, "interval": 1, "intervalUnit": "minutes" },
//!     "overrides": [{ "key": "/health", "rate": { "maxPerInterval": 100, "interval": 60 } }]
//!   }]
//! }"#;
//!
//! let policy = parse(input, "shop").unwrap().expect("site entry");
//! let key = normalize_key("https://shop.example/Health?probe=1");
//! assert_eq!(policy.rate_for(&key).max_per_interval, 100);
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod error;
pub mod key;
pub mod model;
pub mod parser;

pub use error::{Error, Result};
pub use key::{normalize_key, KeyPattern};
pub use model::{Override, Policy, Rate, RateTable};
pub use parser::parse;
