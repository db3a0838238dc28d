//! Generic OpenRTB adapter.
//!
//! Sends one POST per impression to the configured endpoint, passing the
//! request through in plain OpenRTB. The endpoint is a handlebars template
//! whose `{{host}}` comes from the bidder parameters.

use error_stack::{Report, ResultExt};
use handlebars::Handlebars;
use http::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::error::{AdapterError, FanoutError};
use crate::openrtb::{BidRequest, BidResponse, Imp};

use super::{Adapter, BidderResponse, MediaType, RequestData, ResponseData, TypedBid};

const ENDPOINT_TEMPLATE: &str = "endpoint";
const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Deserialize)]
struct ExtImpBidder {
    bidder: Value,
}

#[derive(Debug, Default, Deserialize)]
struct ExtImpGeneric {
    #[serde(default)]
    host: String,
}

pub struct GenericAdapter {
    templates: Handlebars<'static>,
}

impl GenericAdapter {
    /// # Errors
    ///
    /// Returns [`FanoutError::Configuration`] when `endpoint` is not a valid
    /// template.
    pub fn new(endpoint: &str) -> Result<Self, Report<FanoutError>> {
        let mut templates = Handlebars::new();
        templates.set_strict_mode(true);
        templates.register_escape_fn(handlebars::no_escape);
        templates
            .register_template_string(ENDPOINT_TEMPLATE, endpoint)
            .map_err(|err| {
                Report::new(FanoutError::Configuration {
                    message: format!("Invalid endpoint template {endpoint:?}: {err}"),
                })
            })?;
        Ok(Self { templates })
    }

    fn endpoint_url(&self, imp: &Imp) -> Result<String, Report<AdapterError>> {
        let params = bidder_params(imp)?;
        if params.host.is_empty() {
            return Err(Report::new(AdapterError::bad_input("Invalid/Missing Host")));
        }

        let endpoint = self
            .templates
            .render(ENDPOINT_TEMPLATE, &json!({"host": params.host}))
            .map_err(|err| {
                Report::new(AdapterError::bad_input(format!(
                    "Unable to resolve endpoint: {err}"
                )))
            })?;
        let mut url = Url::parse(&format!("{}/", endpoint.trim_end_matches('/'))).change_context(
            AdapterError::bad_input("Unable to construct the URL using the provided host"),
        )?;
        url.query_pairs_mut().append_pair("impID", &imp.id);
        Ok(url.into())
    }
}

impl std::fmt::Debug for GenericAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericAdapter").finish_non_exhaustive()
    }
}

fn bidder_params(imp: &Imp) -> Result<ExtImpGeneric, Report<AdapterError>> {
    let ext = imp.ext.as_ref().ok_or_else(|| {
        Report::new(AdapterError::bad_input(format!(
            "Missing bidder ext in impression {}",
            imp.id
        )))
    })?;
    let bidder_ext = ExtImpBidder::deserialize(ext).change_context(AdapterError::bad_input(
        format!("Missing bidder ext in impression {}", imp.id),
    ))?;
    ExtImpGeneric::deserialize(&bidder_ext.bidder).change_context(AdapterError::bad_input(
        format!("Bad bidder params in impression {}", imp.id),
    ))
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json;charset=utf-8"),
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

/// Video when the impression offers video but no banner, else banner.
fn media_type_for(imp_id: &str, imps: &[Imp]) -> Option<MediaType> {
    imps.iter().find(|imp| imp.id == imp_id).map(|imp| {
        if imp.banner.is_none() && imp.video.is_some() {
            MediaType::Video
        } else {
            MediaType::Banner
        }
    })
}

impl Adapter for GenericAdapter {
    fn make_requests(&self, request: &BidRequest) -> Result<Vec<RequestData>, Report<AdapterError>> {
        if request.imp.is_empty() {
            return Err(Report::new(AdapterError::bad_input(
                "No imps present in request",
            )));
        }

        request
            .imp
            .iter()
            .map(|imp| {
                let uri = self.endpoint_url(imp)?;
                let single = BidRequest {
                    imp: vec![imp.clone()],
                    ..request.clone()
                };
                let body = serde_json::to_vec(&single).change_context(
                    AdapterError::bad_input("Unable to encode the bid request"),
                )?;
                Ok(RequestData {
                    method: Method::POST,
                    uri,
                    body,
                    headers: json_headers(),
                })
            })
            .collect()
    }

    fn make_bids(
        &self,
        internal: &BidRequest,
        _external: &RequestData,
        response: &ResponseData,
    ) -> Result<Option<BidderResponse>, Report<AdapterError>> {
        match response.status {
            StatusCode::NO_CONTENT => return Ok(None),
            StatusCode::BAD_REQUEST => {
                return Err(Report::new(AdapterError::bad_input(
                    "Unexpected status code: 400. Run with request.debug = 1 for more info",
                )))
            }
            StatusCode::OK => {}
            status => {
                return Err(Report::new(AdapterError::bad_server_response(format!(
                    "Unexpected status code: {}. Run with request.debug = 1 for more info",
                    status.as_u16()
                ))))
            }
        }

        let bid_response: BidResponse = serde_json::from_slice(&response.body).change_context(
            AdapterError::bad_server_response("Unable to decode the bid response"),
        )?;

        let mut bidder_response = BidderResponse {
            currency: bid_response
                .cur
                .clone()
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            bids: Vec::new(),
            errors: Vec::new(),
        };
        for bid in bid_response.seatbid.into_iter().flat_map(|seat| seat.bid) {
            match media_type_for(&bid.impid, &internal.imp) {
                Some(bid_type) => bidder_response.bids.push(TypedBid { bid, bid_type }),
                None => bidder_response
                    .errors
                    .push(AdapterError::bad_input(format!(
                        "Failed to find impression \"{}\"",
                        bid.impid
                    ))),
            }
        }

        Ok(Some(bidder_response))
    }
}
