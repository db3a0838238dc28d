use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &u8) -> bool {
    *value == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

/// Reads an explicit JSON `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Subset of an OpenRTB 2.x bid request handled by the fan-out core.
///
/// Fields the core never inspects are kept in `extra` so they survive the
/// round trip to bidders unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BidRequest {
    /// Unique ID of the bid request, provided by the exchange.
    pub id: String,
    #[serde(default)]
    pub imp: Vec<Imp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<Site>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<App>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regs: Option<Regs>,
    /// 1 marks a test request; it also forces debug output.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub test: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Imp {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<Banner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<Video>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidfloor: Option<f64>,
    /// Opaque extension: `prebid`, `context`, or bidder-name keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub format: Vec<Format>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<u32>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Video {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mimes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<u32>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Publisher {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Site {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<Publisher>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct App {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<Publisher>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ua: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<Geo>,
    /// Limit-ad-tracking signal: 1 means the user asked not to be tracked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lmt: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ifa: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub didsha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub didmd5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpidsha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpidmd5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macsha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macmd5: Option<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyeruid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yob: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<Geo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fd: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pchain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Regs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coppa: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

// ============================================================================
// Extensions
// ============================================================================

/// Parsed `request.ext`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestExt {
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "ExtRequestPrebid::is_empty"
    )]
    pub prebid: ExtRequestPrebid,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

/// Parsed `request.ext.prebid`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtRequestPrebid {
    /// Request-scoped bidder aliases: alias name -> core bidder name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schains: Vec<ExtRequestPrebidSChain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<ExtRequestPrebidCache>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targeting: Option<ExtRequestTargeting>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bidadjustmentfactors: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub debug: bool,
    /// Bidders exempted from opt-out enforcement; `"*"` exempts everyone.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nosale: Vec<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

impl ExtRequestPrebid {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One `request.ext.prebid.schains[]` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtRequestPrebidSChain {
    #[serde(default)]
    pub bidders: Vec<String>,
    pub schain: SupplyChain,
}

/// OpenRTB `SupplyChain` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplyChain {
    #[serde(default)]
    pub complete: u8,
    #[serde(default)]
    pub nodes: Vec<SupplyChainNode>,
    #[serde(default)]
    pub ver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplyChainNode {
    #[serde(default)]
    pub asi: String,
    #[serde(default)]
    pub sid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hp: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

/// Body of `source.ext` once a chain has been selected for a bidder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtSourceSChain {
    pub schain: SupplyChain,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtRequestPrebidCache {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bids: Option<ExtRequestPrebidCacheEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vastxml: Option<ExtRequestPrebidCacheEntry>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtRequestPrebidCacheEntry {
    #[serde(rename = "returnCreative", skip_serializing_if = "Option::is_none")]
    pub return_creative: Option<bool>,
    /// `ttlseconds` and other cache keys forwarded untouched.
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtRequestTargeting {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricegranularity: Option<Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub includewinners: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub includebidderkeys: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub includeformat: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub preferdeals: bool,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

/// Parsed `user.ext`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserExt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digitrust: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prebid: Option<UserExtPrebid>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserExtPrebid {
    #[serde(default)]
    pub buyeruids: BTreeMap<String, String>,
}

/// Parsed `regs.ext`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegsExt {
    /// Kept untyped so an out-of-range signal can be reported precisely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gdpr: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub us_privacy: Option<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

// ============================================================================
// Response
// ============================================================================

/// Subset of an OpenRTB 2.x bid response returned by bidders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BidResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub seatbid: Vec<SeatBid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cur: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeatBid {
    #[serde(default)]
    pub bid: Vec<Bid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat: Option<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub impid: String,
    #[serde(default)]
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nurl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burl: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adomain: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dealid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = json!({
            "id": "req-1",
            "imp": [{"id": "imp-1", "banner": {"format": [{"w": 300, "h": 250}]}, "instl": 1}],
            "tmax": 500,
            "cur": ["USD"]
        });
        let request: BidRequest = serde_json::from_value(raw.clone()).expect("should parse");
        assert_eq!(request.imp[0].extra.get("instl"), Some(&json!(1)));

        let back = serde_json::to_value(&request).expect("should serialize");
        assert_eq!(back, raw);
    }

    #[test]
    fn test_request_ext_omits_empty_prebid() {
        let ext = RequestExt {
            prebid: ExtRequestPrebid::default(),
            extra: HashMap::from([("other".to_string(), json!(true))]),
        };
        assert_eq!(
            serde_json::to_value(&ext).expect("should serialize"),
            json!({"other": true})
        );
    }

    #[test]
    fn test_cache_entry_uses_camel_case_return_creative() {
        let cache: ExtRequestPrebidCache =
            serde_json::from_value(json!({"bids": {"returnCreative": false}, "vastxml": {}}))
                .expect("should parse cache");
        assert_eq!(
            cache.bids.and_then(|b| b.return_creative),
            Some(false),
            "returnCreative should map onto return_creative"
        );
        assert_eq!(cache.vastxml, Some(ExtRequestPrebidCacheEntry::default()));
    }

    #[test]
    fn test_cache_and_targeting_keep_unknown_keys() {
        let raw = json!({
            "prebid": {
                "cache": {"bids": {"ttlseconds": 300}, "vastxml": {"returnCreative": true}},
                "targeting": {"pricegranularity": "med", "includebrandcategory": {"primaryadserver": 1}}
            }
        });
        let ext: RequestExt = serde_json::from_value(raw.clone()).expect("should parse ext");
        let out = serde_json::to_value(&ext).expect("should serialize ext");

        assert_eq!(out, raw, "cache and targeting should round-trip unchanged");
    }

    #[test]
    fn test_null_prebid_reads_as_default() {
        let ext: RequestExt =
            serde_json::from_value(json!({"prebid": null})).expect("null prebid should parse");
        assert!(ext.prebid.is_empty());
    }
}
