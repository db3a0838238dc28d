//! Catalogue of the core bidders this server knows how to address.
//!
//! Aliases declared on a request always resolve to one of these names.

use std::collections::BTreeSet;

/// Static metadata for a core bidder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreBidder {
    pub name: &'static str,
    /// IAB Global Vendor List id, used for consent checks.
    pub gvl_vendor_id: Option<u16>,
}

pub const CORE_BIDDERS: &[CoreBidder] = &[
    CoreBidder {
        name: "appnexus",
        gvl_vendor_id: Some(32),
    },
    CoreBidder {
        name: "generic",
        gvl_vendor_id: None,
    },
    CoreBidder {
        name: "ix",
        gvl_vendor_id: Some(10),
    },
    CoreBidder {
        name: "openx",
        gvl_vendor_id: Some(69),
    },
    CoreBidder {
        name: "pubmatic",
        gvl_vendor_id: Some(76),
    },
    CoreBidder {
        name: "rubicon",
        gvl_vendor_id: Some(52),
    },
    CoreBidder {
        name: "sovrn",
        gvl_vendor_id: Some(13),
    },
];

/// Returns the names of every core bidder.
#[must_use]
pub fn core_bidder_names() -> BTreeSet<&'static str> {
    CORE_BIDDERS.iter().map(|bidder| bidder.name).collect()
}

#[must_use]
pub fn is_core_bidder(name: &str) -> bool {
    CORE_BIDDERS.iter().any(|bidder| bidder.name == name)
}

/// Looks up the consent-framework vendor id of a core bidder.
#[must_use]
pub fn gvl_vendor_id(core_bidder: &str) -> Option<u16> {
    CORE_BIDDERS
        .iter()
        .find(|bidder| bidder.name == core_bidder)
        .and_then(|bidder| bidder.gvl_vendor_id)
}
