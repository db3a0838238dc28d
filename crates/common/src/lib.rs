//! Request fan-out core for a real-time bidding auction server.
//!
//! Turns one inbound OpenRTB auction request into isolated, privacy-compliant
//! per-bidder requests, and runs them through bidder adapters.
//!
//! # Modules
//!
//! - [`adapters`]: Bidder adapter contract, the generic OpenRTB adapter and the registry
//! - [`bidders`]: Catalogue of core bidders and their consent vendor ids
//! - [`constants`]: Extension keys and other shared constants
//! - [`dispatch`]: Concurrent, timeout-bounded execution of bidder requests
//! - [`error`]: Error types and error handling utilities
//! - [`fanout`]: Impression partitioning, supply chains, buyer ids and the orchestrator
//! - [`openrtb`]: The OpenRTB request/response model
//! - [`privacy`]: Consent, opt-out and limited-tracking regimes and redaction
//! - [`settings`]: Configuration management and validation
//! - [`test_support`]: Testing utilities and fixtures
//! - [`usersync`]: Lookup of previously synced buyer ids

pub mod adapters;
pub mod bidders;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod fanout;
pub mod openrtb;
pub mod privacy;
pub mod settings;
pub mod usersync;
