//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the media-session core:
//! - Logging and tracing infrastructure
//! - Configuration and bridge injection
//! - Session event bus
//!
//! ## Overview
//!
//! Every other core crate depends on this one for its logging conventions,
//! its view of the host bridges, and the channel session callbacks travel on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
