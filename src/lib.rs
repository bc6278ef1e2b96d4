//! Warden - request classification front door for a proof-of-work gateway
//!
//! Warden owns the substrate the challenge gateway consults before deciding
//! what to do with a request:
//!
//! - a bounded, cost-aware concurrent cache ([`cache::BoundedCache`])
//! - the origin metadata pipeline that feeds link previews on challenge pages
//!   ([`metadata::MetadataPipeline`])
//! - the DNSBL client reputation cache ([`reputation::ReputationCache`])
//!
//! Cache instances are constructed explicitly and passed to whoever needs
//! them; there are no process-wide singletons.

pub mod app;
pub mod cache;
pub mod config;
pub mod metadata;
pub mod reputation;
pub mod types;

pub use app::{MetadataReport, ReputationReport, Warden};
pub use config::Args;
pub use types::{Result, WardenError};
