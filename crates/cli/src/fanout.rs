//! `pfcli fanout`: run the fan-out pipeline on a request file and print the
//! per-bidder requests.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::{json, Value};

use prebid_fanout_common::adapters::AdapterRegistry;
use prebid_fanout_common::fanout::{
    AuctionRequest, CookieFlag, DemandSource, Fanout, FanoutOrchestrator, RequestLabels,
    RequestType,
};
use prebid_fanout_common::openrtb::BidRequest;
use prebid_fanout_common::settings::Settings;
use prebid_fanout_common::usersync::{UidsCookie, UserSyncStore};

use crate::config::load_settings;
use crate::error::CliError;

pub struct FanoutArgs {
    pub request: PathBuf,
    pub config: Option<PathBuf>,
    pub uids_cookie: Option<String>,
    pub request_type: RequestType,
    pub pub_id: String,
    pub with_adapters: bool,
}

pub fn run(args: &FanoutArgs) -> Result<(), CliError> {
    let output = fanout_json(args)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn fanout_json(args: &FanoutArgs) -> Result<Value, CliError> {
    let settings = match &args.config {
        Some(path) => load_settings(path)?,
        None => Settings::from_toml("").map_err(|r| CliError::Config(format!("{r:?}")))?,
    };

    let raw = fs::read_to_string(&args.request).map_err(|e| {
        CliError::Request(format!("Failed to read {}: {e}", args.request.display()))
    })?;
    let bid_request: BidRequest = serde_json::from_str(&raw)?;

    let uids_cookie = args
        .uids_cookie
        .as_deref()
        .map(|header| UidsCookie::from_header(header, Utc::now()));
    let no_syncs: HashMap<String, String> = HashMap::new();
    let user_syncs: &dyn UserSyncStore = match &uids_cookie {
        Some(cookie) => cookie,
        None => &no_syncs,
    };

    let labels = RequestLabels {
        source: demand_source(&bid_request),
        rtype: args.request_type,
        pub_id: args.pub_id.clone(),
        cookie_flag: if uids_cookie.is_some() {
            CookieFlag::Yes
        } else {
            CookieFlag::Unknown
        },
    };

    let request = AuctionRequest::new(bid_request, user_syncs, labels)
        .map_err(|r| CliError::Request(format!("{r:?}")))?;

    let fanout = FanoutOrchestrator::new(&settings)
        .fan_out(&request)
        .map_err(|reports| {
            let messages: Vec<String> = reports.iter().map(ToString::to_string).collect();
            CliError::Fanout(messages.join("; "))
        })?;

    let adapter_calls = if args.with_adapters {
        Some(adapter_calls(&settings, &fanout)?)
    } else {
        None
    };

    Ok(render(&fanout, adapter_calls))
}

fn demand_source(bid_request: &BidRequest) -> DemandSource {
    if bid_request.app.is_some() {
        DemandSource::App
    } else if bid_request.site.is_some() {
        DemandSource::Web
    } else {
        DemandSource::Unknown
    }
}

fn render(fanout: &Fanout, adapter_calls: Option<Value>) -> Value {
    let bidders: Vec<Value> = fanout
        .bidder_requests
        .iter()
        .map(|br| {
            json!({
                "bidder": br.bidder_name,
                "core_bidder": br.core_bidder,
                "labels": br.labels,
                "redactions": fanout.privacy.redactions_for(&br.bidder_name),
                "request": br.bid_request,
            })
        })
        .collect();

    let mut output = json!({
        "bidders": bidders,
        "directives": fanout.directives,
        "errors": fanout.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
    });
    if let (Some(calls), Some(obj)) = (adapter_calls, output.as_object_mut()) {
        obj.insert("adapter_calls".to_string(), calls);
    }
    output
}

fn adapter_calls(settings: &Settings, fanout: &Fanout) -> Result<Value, CliError> {
    let registry = AdapterRegistry::from_settings(settings)
        .map_err(|r| CliError::Config(format!("{r:?}")))?;

    let mut calls = serde_json::Map::new();
    for br in &fanout.bidder_requests {
        let Some(adapter) = registry.get(&br.core_bidder) else {
            calls.insert(
                br.bidder_name.clone(),
                json!({ "error": format!("no adapter configured for {}", br.core_bidder) }),
            );
            continue;
        };
        let entry = match adapter.make_requests(&br.bid_request) {
            Ok(requests) => Value::Array(
                requests
                    .iter()
                    .map(|r| json!({ "method": r.method.as_str(), "uri": r.uri }))
                    .collect(),
            ),
            Err(report) => json!({ "error": report.to_string() }),
        };
        calls.insert(br.bidder_name.clone(), entry);
    }
    Ok(Value::Object(calls))
}
