//! Request directives consumed by the auction stage after bidders respond.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;

use crate::openrtb::{BidRequest, ExtRequestPrebidCacheEntry, RequestExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheInstructions {
    pub cache_bids: bool,
    pub cache_vast: bool,
    pub return_creative: bool,
}

impl Default for CacheInstructions {
    fn default() -> Self {
        Self {
            cache_bids: false,
            cache_vast: false,
            return_creative: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetData {
    pub price_granularity: Option<Value>,
    pub include_winners: bool,
    pub include_bidder_keys: bool,
    pub include_cache_bids: bool,
    pub include_cache_vast: bool,
    pub include_format: bool,
    pub prefer_deals: bool,
}

/// Everything the auction stage needs to know about the request beyond the
/// bidder responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuctionDirectives {
    pub cache: CacheInstructions,
    pub targeting: Option<TargetData>,
    pub debug: bool,
    pub bid_adjustment_factors: BTreeMap<String, f64>,
}

impl AuctionDirectives {
    #[must_use]
    pub fn from_request(request: &BidRequest, ext: &RequestExt) -> Self {
        let cache = cache_instructions(ext);
        Self {
            targeting: target_data(ext, &cache),
            debug: debug_enabled(request, ext),
            bid_adjustment_factors: bid_adjustment_factors(ext),
            cache,
        }
    }
}

/// Cache flags from `ext.prebid.cache`.
///
/// `return_creative` defaults to true. If only one of `bids`/`vastxml` sets it
/// explicitly that value wins; if both do, either one being true is enough.
#[must_use]
pub fn cache_instructions(ext: &RequestExt) -> CacheInstructions {
    let Some(cache) = &ext.prebid.cache else {
        return CacheInstructions::default();
    };

    let explicit = |entry: &Option<ExtRequestPrebidCacheEntry>| {
        entry.as_ref().and_then(|entry| entry.return_creative)
    };
    let return_creative = match (explicit(&cache.bids), explicit(&cache.vastxml)) {
        (Some(bids), Some(vast)) => bids || vast,
        (Some(value), None) | (None, Some(value)) => value,
        (None, None) => true,
    };

    CacheInstructions {
        cache_bids: cache.bids.is_some(),
        cache_vast: cache.vastxml.is_some(),
        return_creative,
    }
}

/// Targeting keys to emit; `None` unless `ext.prebid.targeting` is present.
#[must_use]
pub fn target_data(ext: &RequestExt, cache: &CacheInstructions) -> Option<TargetData> {
    ext.prebid.targeting.as_ref().map(|targeting| TargetData {
        price_granularity: targeting.pricegranularity.clone(),
        include_winners: targeting.includewinners,
        include_bidder_keys: targeting.includebidderkeys,
        include_cache_bids: cache.cache_bids,
        include_cache_vast: cache.cache_vast,
        include_format: targeting.includeformat,
        prefer_deals: targeting.preferdeals,
    })
}

/// `test: 1` on the request forces debug output.
#[must_use]
pub fn debug_enabled(request: &BidRequest, ext: &RequestExt) -> bool {
    request.test == 1 || ext.prebid.debug
}

#[must_use]
pub fn bid_adjustment_factors(ext: &RequestExt) -> BTreeMap<String, f64> {
    ext.prebid.bidadjustmentfactors.clone()
}

/// Shuffles bidders in place so no bidder is systematically called first.
pub fn randomize_bidders<T, R: Rng + ?Sized>(bidders: &mut [T], rng: &mut R) {
    bidders.shuffle(rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openrtb::{ExtRequestPrebidCache, ExtRequestTargeting};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn cache_ext(bids: Option<Option<bool>>, vast: Option<Option<bool>>) -> RequestExt {
        let entry = |rc: Option<bool>| ExtRequestPrebidCacheEntry {
            return_creative: rc,
            ..Default::default()
        };
        let mut ext = RequestExt::default();
        ext.prebid.cache = Some(ExtRequestPrebidCache {
            bids: bids.map(entry),
            vastxml: vast.map(entry),
            ..Default::default()
        });
        ext
    }

    #[test]
    fn test_cache_defaults_without_cache_block() {
        assert_eq!(
            cache_instructions(&RequestExt::default()),
            CacheInstructions {
                cache_bids: false,
                cache_vast: false,
                return_creative: true
            }
        );
    }

    #[test]
    fn test_cache_return_creative_rules() {
        let single = cache_instructions(&cache_ext(Some(Some(false)), None));
        assert!(single.cache_bids);
        assert!(!single.cache_vast);
        assert!(!single.return_creative, "single explicit value wins");

        let both = cache_instructions(&cache_ext(Some(Some(false)), Some(Some(true))));
        assert!(both.return_creative, "explicit values are OR-ed");

        let both_false = cache_instructions(&cache_ext(Some(Some(false)), Some(Some(false))));
        assert!(!both_false.return_creative);

        let implicit = cache_instructions(&cache_ext(Some(None), Some(None)));
        assert!(implicit.return_creative);
        assert!(implicit.cache_vast);
    }

    #[test]
    fn test_target_data_only_with_targeting() {
        let cache = CacheInstructions::default();
        assert_eq!(target_data(&RequestExt::default(), &cache), None);

        let mut ext = cache_ext(Some(None), None);
        ext.prebid.targeting = Some(ExtRequestTargeting {
            pricegranularity: Some(json!("med")),
            includewinners: true,
            ..Default::default()
        });
        let cache = cache_instructions(&ext);
        let data = target_data(&ext, &cache).expect("targeting requested");
        assert_eq!(data.price_granularity, Some(json!("med")));
        assert!(data.include_winners);
        assert!(data.include_cache_bids);
        assert!(!data.include_cache_vast);
    }

    #[test]
    fn test_test_flag_forces_debug() {
        let ext = RequestExt::default();
        let mut request = BidRequest::default();
        assert!(!debug_enabled(&request, &ext));

        request.test = 1;
        assert!(debug_enabled(&request, &ext));

        let mut debug_ext = RequestExt::default();
        debug_ext.prebid.debug = true;
        assert!(debug_enabled(&BidRequest::default(), &debug_ext));
    }

    #[test]
    fn test_directives_from_request() {
        let mut ext = RequestExt::default();
        ext.prebid
            .bidadjustmentfactors
            .insert("appnexus".to_string(), 0.9);

        let directives = AuctionDirectives::from_request(&BidRequest::default(), &ext);
        assert_eq!(directives.bid_adjustment_factors.get("appnexus"), Some(&0.9));
        assert!(directives.targeting.is_none());
        assert!(!directives.debug);
    }

    #[test]
    fn test_seeded_shuffle_is_deterministic() {
        let original: Vec<u32> = (0..20).collect();

        let mut first = original.clone();
        randomize_bidders(&mut first, &mut StdRng::seed_from_u64(7));
        let mut second = original.clone();
        randomize_bidders(&mut second, &mut StdRng::seed_from_u64(7));

        assert_eq!(first, second);
        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, original, "shuffle is a permutation");
    }
}
