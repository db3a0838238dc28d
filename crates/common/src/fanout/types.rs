//! Core types for the fan-out pipeline.

use std::collections::BTreeMap;

use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FanoutError;
use crate::openrtb::{BidRequest, RequestExt};
use crate::settings::IntegrationType;
use crate::usersync::UserSyncStore;

use super::aliases::validate_aliases;

/// Where the inbound traffic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemandSource {
    Web,
    App,
    Unknown,
}

/// Endpoint the inbound request was received on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    #[serde(rename = "openrtb2-web")]
    OpenRtb2Web,
    #[serde(rename = "openrtb2-app")]
    OpenRtb2App,
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "amp")]
    Amp,
}

impl RequestType {
    #[must_use]
    pub fn integration_type(self) -> IntegrationType {
        match self {
            Self::OpenRtb2Web => IntegrationType::Web,
            Self::OpenRtb2App => IntegrationType::App,
            Self::Video => IntegrationType::Video,
            Self::Amp => IntegrationType::Amp,
        }
    }
}

/// Whether a usable sync cookie existed for the bidder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CookieFlag {
    Yes,
    No,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterBid {
    Present,
    None,
}

/// Caller labels attached to the inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLabels {
    pub source: DemandSource,
    pub rtype: RequestType,
    pub pub_id: String,
    pub cookie_flag: CookieFlag,
}

/// Observability labels attached to each bidder request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterLabels {
    pub source: DemandSource,
    pub rtype: RequestType,
    pub adapter: String,
    pub pub_id: String,
    pub cookie_flag: CookieFlag,
    pub adapter_bids: AdapterBid,
}

/// One inbound auction request, ready to be fanned out.
///
/// The user-sync store is borrowed: it outlives every request and is only
/// ever read.
pub struct AuctionRequest<'a> {
    pub bid_request: BidRequest,
    /// Parsed `bid_request.ext`.
    pub ext: RequestExt,
    pub user_syncs: &'a dyn UserSyncStore,
    pub labels: RequestLabels,
}

impl<'a> AuctionRequest<'a> {
    /// Parse the request extension and validate the alias table.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::MalformedInput`] when `request.ext` cannot be
    /// decoded and [`FanoutError::PolicyValidation`] when an alias is invalid.
    pub fn new(
        bid_request: BidRequest,
        user_syncs: &'a dyn UserSyncStore,
        labels: RequestLabels,
    ) -> Result<Self, Report<FanoutError>> {
        let ext = parse_request_ext(&bid_request)?;
        validate_aliases(&ext.prebid.aliases)?;

        Ok(Self {
            bid_request,
            ext,
            user_syncs,
            labels,
        })
    }

    /// Request-scoped alias table: alias -> core bidder.
    #[must_use]
    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.ext.prebid.aliases
    }
}

impl std::fmt::Debug for AuctionRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuctionRequest")
            .field("bid_request", &self.bid_request)
            .field("ext", &self.ext)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

/// Decode `request.ext` into its typed form. An absent or `null` extension
/// decodes to the empty extension.
///
/// # Errors
///
/// Returns [`FanoutError::MalformedInput`] if the extension does not match the
/// expected shape.
pub fn parse_request_ext(bid_request: &BidRequest) -> Result<RequestExt, Report<FanoutError>> {
    match &bid_request.ext {
        None | Some(Value::Null) => Ok(RequestExt::default()),
        Some(raw) => RequestExt::deserialize(raw).change_context(FanoutError::malformed(
            "Error decoding Request.ext",
        )),
    }
}

/// A request addressed to exactly one bidder.
#[derive(Debug, Clone, PartialEq)]
pub struct BidderRequest {
    /// Name the request used for the bidder, possibly an alias.
    pub bidder_name: String,
    /// Core bidder the name resolves to.
    pub core_bidder: String,
    pub bid_request: BidRequest,
    pub labels: AdapterLabels,
}
