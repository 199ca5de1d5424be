//! # harvest
//!
//! Pulls personal data out of paginated REST APIs (GitHub, Readwise,
//! Raindrop, Hacker News, Twitter, PayPal) without losing progress to rate
//! limits or interrupts, and summarises it through the Anthropic API.
//!
//! - [`fetch`]: the paginated fetcher and its retry/rate-limit throttle
//! - [`progress`]: the on-disk store of per-record results
//! - [`processor`]: resumable per-record processing over that store
//! - [`providers`]: endpoint presets
//! - [`summarize`]: per-record summaries and period digests

pub mod config;
pub mod error;
pub mod fetch;
pub mod processor;
pub mod progress;
pub mod providers;
pub mod summarize;
pub mod telemetry;
pub mod window;
