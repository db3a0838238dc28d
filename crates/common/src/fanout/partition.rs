//! Splits impressions into per-bidder copies.

use std::collections::{BTreeMap, BTreeSet};

use error_stack::Report;
use serde_json::{Map, Value};

use crate::constants::{BIDDER_EXT_KEY, FIRST_PARTY_DATA_CONTEXT_EXT_KEY, PREBID_EXT_KEY};
use crate::error::FanoutError;
use crate::openrtb::Imp;

use super::imp_ext::{decode_imp_exts, ExtDecodeMode};

#[derive(Debug, Default)]
pub struct Partition {
    /// Sanitized impressions keyed by the bidder name the request used.
    pub imps_by_bidder: BTreeMap<String, Vec<Imp>>,
    /// Impressions skipped in lenient mode.
    pub errors: Vec<Report<FanoutError>>,
}

/// Builds one sanitized impression copy per bidder addressed by each
/// impression.
///
/// Bidders come from `ext.prebid.bidder` when it is an object, otherwise from
/// the top-level extension keys. Each copy's `ext` carries only that bidder's
/// parameters under `"bidder"`, the shared `"prebid"` block without its
/// `"bidder"` field, and `"context"`.
///
/// Only names in `known_bidders` are targets. Other keys (`gpid`, `tid`,
/// `data`, misspelled bidders) are skipped, so an impression that addresses
/// no known bidder contributes to no partition.
///
/// # Errors
///
/// Fails with every decode error when `mode` is [`ExtDecodeMode::Strict`] and
/// any impression extension is malformed.
pub fn partition_imps(
    imps: &[Imp],
    mode: ExtDecodeMode,
    known_bidders: &BTreeSet<String>,
) -> Result<Partition, Vec<Report<FanoutError>>> {
    let decoded = decode_imp_exts(imps, mode)?;
    let mut imps_by_bidder: BTreeMap<String, Vec<Imp>> = BTreeMap::new();

    for (index, ext) in decoded.exts {
        let imp = &imps[index];
        let prebid = ext.get(PREBID_EXT_KEY);
        let context = ext
            .get(FIRST_PARTY_DATA_CONTEXT_EXT_KEY)
            .filter(|value| !value.is_null());

        let targets = prebid
            .and_then(|prebid| prebid.get(BIDDER_EXT_KEY))
            .and_then(Value::as_object)
            .unwrap_or(ext);
        let shared_prebid = prebid.and_then(strip_bidder_field);

        let mut addressed = false;
        for (bidder, params) in targets {
            if bidder == PREBID_EXT_KEY || bidder == FIRST_PARTY_DATA_CONTEXT_EXT_KEY {
                continue;
            }
            if !known_bidders.contains(bidder) {
                log::debug!("Impression {} ext key {bidder:?} is not a known bidder", imp.id);
                continue;
            }
            addressed = true;
            imps_by_bidder
                .entry(bidder.clone())
                .or_default()
                .push(sanitized_imp_copy(imp, params, shared_prebid.as_ref(), context));
        }
        if !addressed {
            log::debug!("Dropping impression {}: no known bidder addressed", imp.id);
        }
    }

    if imps_by_bidder.is_empty() {
        log::debug!("No bidders addressed by {} impressions", imps.len());
    }

    Ok(Partition {
        imps_by_bidder,
        errors: decoded.errors,
    })
}

/// The shared `prebid` block minus its `bidder` field, or `None` when nothing
/// else remains.
fn strip_bidder_field(prebid: &Value) -> Option<Value> {
    match prebid {
        Value::Null => None,
        Value::Object(fields) => {
            let remaining: Map<String, Value> = fields
                .iter()
                .filter(|(key, _)| key.as_str() != BIDDER_EXT_KEY)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            (!remaining.is_empty()).then_some(Value::Object(remaining))
        }
        other => Some(other.clone()),
    }
}

fn sanitized_imp_copy(
    imp: &Imp,
    params: &Value,
    prebid: Option<&Value>,
    context: Option<&Value>,
) -> Imp {
    let mut ext = Map::new();
    ext.insert(BIDDER_EXT_KEY.to_string(), params.clone());
    if let Some(prebid) = prebid {
        ext.insert(PREBID_EXT_KEY.to_string(), prebid.clone());
    }
    if let Some(context) = context {
        ext.insert(FIRST_PARTY_DATA_CONTEXT_EXT_KEY.to_string(), context.clone());
    }

    Imp {
        ext: Some(Value::Object(ext)),
        ..imp.clone()
    }
}
