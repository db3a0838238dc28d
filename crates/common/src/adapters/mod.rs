//! Bidder adapters.
//!
//! An adapter translates a [`BidRequest`] already restricted to one bidder
//! into the HTTP calls that bidder expects, and translates the bidder's
//! responses back into typed bids. Adapters never perform I/O themselves; the
//! [`crate::dispatch`] module sends what they produce.

pub mod generic;

use std::collections::BTreeMap;
use std::sync::Arc;

use error_stack::Report;
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, FanoutError};
use crate::openrtb::{Bid, BidRequest};
use crate::settings::Settings;

use self::generic::GenericAdapter;

/// One outgoing HTTP call produced by an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestData {
    pub method: Method,
    pub uri: String,
    pub body: Vec<u8>,
    pub headers: HeaderMap,
}

/// The bidder's HTTP reply to a [`RequestData`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseData {
    pub status: StatusCode,
    pub body: Vec<u8>,
    pub headers: HeaderMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Banner,
    Video,
    Audio,
    Native,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedBid {
    pub bid: Bid,
    pub bid_type: MediaType,
}

/// Bids parsed from one bidder response, plus per-bid problems that did not
/// invalidate the whole response.
#[derive(Debug, Clone, PartialEq)]
pub struct BidderResponse {
    pub currency: String,
    pub bids: Vec<TypedBid>,
    pub errors: Vec<AdapterError>,
}

/// Trait implemented by every bidder adapter.
pub trait Adapter: Send + Sync {
    /// Builds the HTTP calls for a bidder request.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::BadInput`] when the request cannot be sent to
    /// this bidder, e.g. missing parameters.
    fn make_requests(&self, request: &BidRequest) -> Result<Vec<RequestData>, Report<AdapterError>>;

    /// Parses the reply to one call made by [`Adapter::make_requests`].
    /// `Ok(None)` means the bidder chose not to bid.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::BadInput`] for replies blaming the request and
    /// [`AdapterError::BadServerResponse`] for unusable replies.
    fn make_bids(
        &self,
        internal: &BidRequest,
        external: &RequestData,
        response: &ResponseData,
    ) -> Result<Option<BidderResponse>, Report<AdapterError>>;
}

/// Adapters keyed by core bidder name.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one generic adapter per enabled `[adapters.<name>]` entry.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::Configuration`] when an endpoint template does
    /// not compile.
    pub fn from_settings(settings: &Settings) -> Result<Self, Report<FanoutError>> {
        let mut registry = Self::new();
        for (name, config) in &settings.adapters {
            if !config.enabled {
                log::info!("Adapter {name} is disabled");
                continue;
            }
            registry.register(name, Arc::new(GenericAdapter::new(&config.endpoint)?));
        }
        Ok(registry)
    }

    pub fn register(&mut self, core_bidder: &str, adapter: Arc<dyn Adapter>) {
        log::info!("Registering adapter: {core_bidder}");
        self.adapters.insert(core_bidder.to_string(), adapter);
    }

    #[must_use]
    pub fn get(&self, core_bidder: &str) -> Option<&Arc<dyn Adapter>> {
        self.adapters.get(core_bidder)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
