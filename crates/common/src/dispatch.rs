//! Concurrent dispatch of bidder requests through their adapters.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use error_stack::Report;
use futures::future::join_all;
use futures::stream::{self, StreamExt};

use crate::adapters::{Adapter, AdapterRegistry, BidderResponse, RequestData, ResponseData};
use crate::error::{AdapterError, FanoutError};
use crate::fanout::directives::randomize_bidders;
use crate::fanout::{AdapterBid, AdapterLabels, BidderRequest};
use crate::openrtb::BidRequest;
use crate::settings::AuctionSettings;

/// Sends adapter-built HTTP calls. Injected so dispatch can run against any
/// transport.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: &RequestData) -> Result<ResponseData, Report<FanoutError>>;
}

/// What happened to one bidder request.
#[derive(Debug, Clone)]
pub struct BidderOutcome {
    pub bidder_name: String,
    pub core_bidder: String,
    /// Bids merged across every call the adapter made, if any call produced
    /// a response.
    pub response: Option<BidderResponse>,
    pub errors: Vec<AdapterError>,
    pub elapsed_ms: u64,
    pub labels: AdapterLabels,
}

pub struct Dispatcher<'a> {
    registry: &'a AdapterRegistry,
    client: &'a dyn HttpClient,
    timeout: Duration,
    max_concurrent: usize,
}

impl<'a> Dispatcher<'a> {
    #[must_use]
    pub fn new(
        settings: &AuctionSettings,
        registry: &'a AdapterRegistry,
        client: &'a dyn HttpClient,
    ) -> Self {
        Self {
            registry,
            client,
            timeout: Duration::from_millis(u64::from(settings.timeout_ms)),
            max_concurrent: settings.max_concurrent_bidders.max(1),
        }
    }

    /// Runs every bidder request, at most `max_concurrent_bidders` at a time,
    /// each bounded by the auction timeout. Start order is shuffled so no
    /// bidder is always first in line; outcomes are sorted by bidder name.
    pub async fn dispatch(&self, requests: &[BidderRequest]) -> Vec<BidderOutcome> {
        log::info!(
            "Dispatching {} bidder requests ({} in flight max)",
            requests.len(),
            self.max_concurrent
        );

        let mut order: Vec<&BidderRequest> = requests.iter().collect();
        randomize_bidders(&mut order, &mut rand::thread_rng());

        let mut outcomes: Vec<BidderOutcome> = stream::iter(order)
            .map(|request| self.dispatch_one(request))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;
        outcomes.sort_by(|a, b| a.bidder_name.cmp(&b.bidder_name));
        outcomes
    }

    async fn dispatch_one(&self, request: &BidderRequest) -> BidderOutcome {
        let start_time = Instant::now();

        let (response, errors) = match self.registry.get(&request.core_bidder) {
            None => {
                log::warn!(
                    "No adapter registered for bidder {} ({})",
                    request.bidder_name,
                    request.core_bidder
                );
                (
                    None,
                    vec![AdapterError::bad_input(format!(
                        "No adapter registered for bidder {}",
                        request.core_bidder
                    ))],
                )
            }
            Some(adapter) => {
                match tokio::time::timeout(
                    self.timeout,
                    self.call_adapter(adapter.as_ref(), &request.bid_request),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        log::warn!(
                            "Bidder {} timed out after {}ms",
                            request.bidder_name,
                            self.timeout.as_millis()
                        );
                        (
                            None,
                            vec![AdapterError::Timeout {
                                bidder: request.bidder_name.clone(),
                                timeout_ms: u32::try_from(self.timeout.as_millis())
                                    .unwrap_or(u32::MAX),
                            }],
                        )
                    }
                }
            }
        };

        let has_bids = response
            .as_ref()
            .is_some_and(|response| !response.bids.is_empty());
        BidderOutcome {
            bidder_name: request.bidder_name.clone(),
            core_bidder: request.core_bidder.clone(),
            labels: AdapterLabels {
                adapter_bids: if has_bids {
                    AdapterBid::Present
                } else {
                    AdapterBid::None
                },
                ..request.labels.clone()
            },
            response,
            errors,
            elapsed_ms: millis(start_time.elapsed()),
        }
    }

    async fn call_adapter(
        &self,
        adapter: &dyn Adapter,
        request: &BidRequest,
    ) -> (Option<BidderResponse>, Vec<AdapterError>) {
        let calls = match adapter.make_requests(request) {
            Ok(calls) => calls,
            Err(report) => return (None, vec![report.current_context().clone()]),
        };

        let replies = join_all(calls.iter().map(|call| self.client.send(call))).await;

        let mut merged: Option<BidderResponse> = None;
        let mut errors = Vec::new();
        for (call, reply) in calls.iter().zip(replies) {
            let reply = match reply {
                Ok(reply) => reply,
                Err(report) => {
                    log::debug!("Transport failure for {}: {report:?}", call.uri);
                    errors.push(AdapterError::bad_server_response(format!("{report}")));
                    continue;
                }
            };
            match adapter.make_bids(request, call, &reply) {
                Ok(Some(response)) => match merged.as_mut() {
                    Some(merged) => {
                        merged.bids.extend(response.bids);
                        merged.errors.extend(response.errors);
                    }
                    None => merged = Some(response),
                },
                Ok(None) => {}
                Err(report) => errors.push(report.current_context().clone()),
            }
        }

        if let Some(merged) = merged.as_mut() {
            errors.append(&mut merged.errors);
        }
        (merged, errors)
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
