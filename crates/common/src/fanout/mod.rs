//! Request fan-out.
//!
//! One inbound [`AuctionRequest`] is split into one [`BidderRequest`] per
//! addressed bidder. Each bidder request carries only that bidder's
//! impressions and parameters, its own buyer id and supply chain, and has
//! personal data removed according to the privacy regimes in force.

pub mod aliases;
pub mod directives;
pub mod imp_ext;
pub mod orchestrator;
pub mod partition;
pub mod schain;
pub mod types;
pub mod user;

pub use orchestrator::{Fanout, FanoutOrchestrator};
pub use types::{
    AdapterBid, AdapterLabels, AuctionRequest, BidderRequest, CookieFlag, DemandSource,
    RequestLabels, RequestType,
};
