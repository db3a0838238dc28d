//! Per-bidder supply chain selection.

use std::collections::HashMap;

use error_stack::Report;

use crate::constants::SCHAIN_WILDCARD;
use crate::error::FanoutError;
use crate::openrtb::{ExtSourceSChain, RequestExt, Source, SupplyChain};

/// Supply chains keyed by bidder name, or `"*"` for every other bidder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupplyChainMap {
    chains: HashMap<String, SupplyChain>,
}

impl SupplyChainMap {
    /// The bidder's own chain, else the wildcard chain.
    #[must_use]
    pub fn resolve(&self, bidder: &str) -> Option<&SupplyChain> {
        self.chains
            .get(bidder)
            .or_else(|| self.chains.get(SCHAIN_WILDCARD))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.len()
    }
}

/// Collects `ext.prebid.schains` into a lookup map.
///
/// # Errors
///
/// Returns [`FanoutError::AmbiguousConfiguration`] when a bidder (or the
/// wildcard) is named by more than one entry.
pub fn build_schain_map(ext: &RequestExt) -> Result<SupplyChainMap, Report<FanoutError>> {
    let mut chains = HashMap::new();

    for entry in &ext.prebid.schains {
        for bidder in &entry.bidders {
            if chains.contains_key(bidder) {
                return Err(Report::new(FanoutError::AmbiguousConfiguration {
                    message: format!(
                        "request.ext.prebid.schains contains multiple schains for bidder {bidder}; it must contain no more than one per bidder."
                    ),
                }));
            }
            chains.insert(bidder.clone(), entry.schain.clone());
        }
    }

    Ok(SupplyChainMap { chains })
}

/// The `source` to send to `bidder`.
///
/// When a chain applies the source is cloned (or created) and only its `ext`
/// is replaced with `{"schain": chain}`. Otherwise the original is returned
/// unchanged.
#[must_use]
pub fn apply_schain(
    source: Option<&Source>,
    bidder: &str,
    chains: &SupplyChainMap,
) -> Option<Source> {
    let Some(chain) = chains.resolve(bidder) else {
        return source.cloned();
    };

    let ext = ExtSourceSChain {
        schain: chain.clone(),
    };
    let mut outgoing = source.cloned().unwrap_or_default();
    match serde_json::to_value(&ext) {
        Ok(value) => outgoing.ext = Some(value),
        Err(err) => {
            log::warn!("Failed to encode supply chain for bidder {bidder}: {err}");
        }
    }
    Some(outgoing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openrtb::{ExtRequestPrebidSChain, SupplyChainNode};
    use serde_json::json;

    fn chain(asi: &str) -> SupplyChain {
        SupplyChain {
            complete: 1,
            ver: "1.0".to_string(),
            nodes: vec![SupplyChainNode {
                asi: asi.to_string(),
                sid: "00001".to_string(),
                hp: Some(1),
                ..Default::default()
            }],
            ext: None,
        }
    }

    fn ext_with(entries: Vec<(Vec<&str>, SupplyChain)>) -> RequestExt {
        let mut ext = RequestExt::default();
        ext.prebid.schains = entries
            .into_iter()
            .map(|(bidders, schain)| ExtRequestPrebidSChain {
                bidders: bidders.into_iter().map(str::to_string).collect(),
                schain,
            })
            .collect();
        ext
    }

    #[test]
    fn test_resolve_prefers_specific_over_wildcard() {
        let map = build_schain_map(&ext_with(vec![
            (vec!["appnexus"], chain("specific.com")),
            (vec!["*"], chain("wildcard.com")),
        ]))
        .expect("should build");

        assert_eq!(map.len(), 2);
        assert_eq!(
            map.resolve("appnexus").map(|c| c.nodes[0].asi.as_str()),
            Some("specific.com")
        );
        assert_eq!(
            map.resolve("rubicon").map(|c| c.nodes[0].asi.as_str()),
            Some("wildcard.com")
        );
    }

    #[test]
    fn test_resolve_is_independent_of_declaration_order() {
        let map = build_schain_map(&ext_with(vec![
            (vec!["*"], chain("wildcard.com")),
            (vec!["appnexus", "ix"], chain("specific.com")),
        ]))
        .expect("should build");

        assert_eq!(map.len(), 3);
        for bidder in ["appnexus", "ix"] {
            assert_eq!(
                map.resolve(bidder).map(|c| c.nodes[0].asi.as_str()),
                Some("specific.com"),
                "{bidder} should get its own chain"
            );
        }
        assert_eq!(
            map.resolve("rubicon").map(|c| c.nodes[0].asi.as_str()),
            Some("wildcard.com")
        );
    }

    #[test]
    fn test_duplicate_bidder_is_ambiguous() {
        let err = build_schain_map(&ext_with(vec![
            (vec!["appnexus"], chain("a.com")),
            (vec!["rubicon", "appnexus"], chain("b.com")),
        ]))
        .expect_err("duplicate should fail");

        assert!(matches!(
            err.current_context(),
            FanoutError::AmbiguousConfiguration { .. }
        ));
        assert!(format!("{err}").contains("multiple schains for bidder appnexus"));
    }

    #[test]
    fn test_apply_schain_sets_only_ext() {
        let map = build_schain_map(&ext_with(vec![(vec!["*"], chain("w.com"))]))
            .expect("should build");
        let source = Source {
            tid: Some("tid-1".to_string()),
            ext: Some(json!({"other": true})),
            ..Default::default()
        };

        let outgoing = apply_schain(Some(&source), "ix", &map).expect("should have a source");
        assert_eq!(outgoing.tid.as_deref(), Some("tid-1"));
        assert_eq!(
            outgoing.ext,
            Some(json!({"schain": {"complete": 1, "nodes": [{"asi": "w.com", "sid": "00001", "hp": 1}], "ver": "1.0"}}))
        );
        assert_eq!(source.ext, Some(json!({"other": true})), "input unchanged");
    }

    #[test]
    fn test_apply_schain_without_chain() {
        let map = SupplyChainMap::default();
        assert!(map.is_empty());
        assert_eq!(apply_schain(None, "ix", &map), None);

        let map = build_schain_map(&ext_with(vec![(vec!["ix"], chain("x.com"))]))
            .expect("should build");
        let created = apply_schain(None, "ix", &map).expect("should create a source");
        assert!(created.tid.is_none());
        assert!(created.ext.is_some());
    }
}
