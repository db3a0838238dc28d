//! Fan-out orchestrator: turns one auction request into per-bidder requests.

use std::time::Instant;

use error_stack::{Report, ResultExt};

use crate::error::FanoutError;
use crate::openrtb::{BidRequest, RequestExt};
use crate::privacy::scrub::scrub_request;
use crate::privacy::PrivacyPolicies;
use crate::settings::Settings;

use super::aliases::{resolve_bidder, valid_bidder_names};
use super::directives::AuctionDirectives;
use super::partition::partition_imps;
use super::schain::{apply_schain, build_schain_map};
use super::types::{AdapterBid, AdapterLabels, AuctionRequest, BidderRequest, CookieFlag};
use super::user::{extract_buyer_uids, resolve_user};

/// Result of fanning out one auction request.
#[derive(Debug)]
pub struct Fanout {
    /// One request per addressed bidder, sorted by bidder name.
    pub bidder_requests: Vec<BidderRequest>,
    pub privacy: PrivacyPolicies,
    pub directives: AuctionDirectives,
    /// Non-fatal problems, such as impressions skipped in lenient mode.
    pub errors: Vec<Report<FanoutError>>,
}

/// Builds isolated, privacy-compliant bidder requests.
pub struct FanoutOrchestrator<'a> {
    settings: &'a Settings,
}

impl<'a> FanoutOrchestrator<'a> {
    #[must_use]
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Fans the request out to every bidder its impressions address.
    ///
    /// Shared values (explicit buyer ids, supply chains, the request extension
    /// and the privacy policies) are derived once, then applied to each
    /// bidder's own copy of the request.
    ///
    /// # Errors
    ///
    /// Returns every fatal error found. No bidder requests are produced when
    /// any step fails.
    pub fn fan_out(
        &self,
        request: &AuctionRequest<'_>,
    ) -> Result<Fanout, Vec<Report<FanoutError>>> {
        let start_time = Instant::now();
        let bid_request = &request.bid_request;

        let partition = partition_imps(
            &bid_request.imp,
            self.settings.auction.imp_ext_decode,
            &valid_bidder_names(request.aliases()),
        )?;
        let (user_template, explicit_buyer_uids) =
            extract_buyer_uids(bid_request.user.as_ref()).map_err(|report| vec![report])?;
        let schains = build_schain_map(&request.ext).map_err(|report| vec![report])?;
        let template =
            request_template(bid_request, &request.ext).map_err(|report| vec![report])?;

        let account = self.settings.account(&request.labels.pub_id);
        let privacy = PrivacyPolicies::resolve(
            bid_request,
            &request.ext,
            self.settings,
            account,
            Some(request.labels.rtype.integration_type()),
        )
        .map_err(|report| vec![report])?;
        let directives = AuctionDirectives::from_request(bid_request, &request.ext);

        let mut bidder_requests = Vec::with_capacity(partition.imps_by_bidder.len());
        for (bidder, imps) in partition.imps_by_bidder {
            let core_bidder = resolve_bidder(&bidder, request.aliases()).to_string();
            let (user, had_prior_sync) = resolve_user(
                user_template.as_ref(),
                &bidder,
                &core_bidder,
                &explicit_buyer_uids,
                request.user_syncs,
            );

            let mut outgoing = template.clone();
            outgoing.imp = imps;
            outgoing.user = user;
            outgoing.source = apply_schain(bid_request.source.as_ref(), &bidder, &schains);
            let redactions = privacy.redactions_for(&bidder);
            if !redactions.is_empty() {
                log::debug!("Redacting {redactions:?} for bidder {bidder}");
            }
            let outgoing = scrub_request(outgoing, &redactions);

            let cookie_flag = if !had_prior_sync && bid_request.app.is_none() {
                CookieFlag::No
            } else {
                CookieFlag::Yes
            };

            bidder_requests.push(BidderRequest {
                labels: AdapterLabels {
                    source: request.labels.source,
                    rtype: request.labels.rtype,
                    adapter: core_bidder.clone(),
                    pub_id: request.labels.pub_id.clone(),
                    cookie_flag,
                    adapter_bids: AdapterBid::Present,
                },
                bidder_name: bidder,
                core_bidder,
                bid_request: outgoing,
            });
        }

        log::info!(
            "Fanned request {} out to {} bidders in {}µs",
            bid_request.id,
            bidder_requests.len(),
            start_time.elapsed().as_micros()
        );

        Ok(Fanout {
            bidder_requests,
            privacy,
            directives,
            errors: partition.errors,
        })
    }
}

/// The request every bidder copy starts from: no impressions, no user, and
/// the shared extension with supply chains removed.
fn request_template(
    bid_request: &BidRequest,
    ext: &RequestExt,
) -> Result<BidRequest, Report<FanoutError>> {
    let shared_ext = if bid_request.ext.as_ref().is_none_or(serde_json::Value::is_null) {
        None
    } else {
        let mut shared = ext.clone();
        shared.prebid.schains.clear();
        Some(
            serde_json::to_value(&shared)
                .change_context(FanoutError::malformed("Error encoding Request.ext"))?,
        )
    };

    Ok(BidRequest {
        id: bid_request.id.clone(),
        imp: Vec::new(),
        site: bid_request.site.clone(),
        app: bid_request.app.clone(),
        device: bid_request.device.clone(),
        user: None,
        source: None,
        regs: bid_request.regs.clone(),
        test: bid_request.test,
        ext: shared_ext,
        extra: bid_request.extra.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::imp_ext::ExtDecodeMode;
    use crate::fanout::types::{DemandSource, RequestLabels, RequestType};
    use crate::privacy::PersonalDataField;
    use crate::test_support::tests::{
        auction_request, bid_request, create_test_settings, tcf_consent_string, web_labels,
    };
    use serde_json::json;
    use std::collections::HashMap;

    fn two_bidder_request() -> BidRequest {
        bid_request(json!({
            "id": "req-1",
            "imp": [
                {"id": "imp-1", "banner": {"format": [{"w": 300, "h": 250}]},
                 "ext": {"prebid": {"bidder": {"appnexus": {"placementId": 1}, "districtm": {"placementId": 2}}}}},
                {"id": "imp-2", "video": {"mimes": ["video/mp4"]},
                 "ext": {"rubicon": {"zoneId": 3}, "context": {"data": {"k": "v"}}}}
            ],
            "site": {"page": "https://example.com", "publisher": {"id": "test-pub"}},
            "device": {"ip": "198.51.100.23", "ifa": "device-ifa"},
            "user": {"id": "user-1", "ext": {"prebid": {"buyeruids": {"districtm": "dm-explicit"}}}},
            "source": {"tid": "tid-1"},
            "tmax": 800,
            "ext": {"prebid": {
                "aliases": {"districtm": "appnexus"},
                "schains": [
                    {"bidders": ["appnexus"], "schain": {"complete": 1, "nodes": [{"asi": "an.com", "sid": "1", "hp": 1}], "ver": "1.0"}},
                    {"bidders": ["*"], "schain": {"complete": 0, "nodes": [], "ver": "1.0"}}
                ],
                "targeting": {"includewinners": true}
            }}
        }))
    }

    fn bidder<'r>(fanout: &'r Fanout, name: &str) -> &'r BidderRequest {
        fanout
            .bidder_requests
            .iter()
            .find(|request| request.bidder_name == name)
            .expect("bidder request should exist")
    }

    #[test]
    fn test_fan_out_isolates_bidders() {
        let settings = create_test_settings();
        let syncs = HashMap::from([("appnexus".to_string(), "an-synced".to_string())]);
        let request = auction_request(two_bidder_request(), &syncs);

        let fanout = FanoutOrchestrator::new(&settings)
            .fan_out(&request)
            .expect("fan-out should succeed");

        let names: Vec<_> = fanout
            .bidder_requests
            .iter()
            .map(|r| r.bidder_name.as_str())
            .collect();
        assert_eq!(names, vec!["appnexus", "districtm", "rubicon"]);

        let appnexus = bidder(&fanout, "appnexus");
        assert_eq!(appnexus.core_bidder, "appnexus");
        assert_eq!(appnexus.bid_request.imp.len(), 1);
        assert_eq!(
            appnexus.bid_request.imp[0].ext,
            Some(json!({"bidder": {"placementId": 1}}))
        );
        assert_eq!(
            appnexus.bid_request.user.as_ref().and_then(|u| u.buyeruid.as_deref()),
            Some("an-synced")
        );
        assert_eq!(appnexus.labels.cookie_flag, CookieFlag::Yes);

        let districtm = bidder(&fanout, "districtm");
        assert_eq!(districtm.core_bidder, "appnexus");
        assert_eq!(districtm.labels.adapter, "appnexus");
        assert_eq!(
            districtm.bid_request.user.as_ref().and_then(|u| u.buyeruid.as_deref()),
            Some("dm-explicit"),
            "explicit id keyed by alias wins"
        );

        let rubicon = bidder(&fanout, "rubicon");
        assert_eq!(rubicon.bid_request.imp[0].id, "imp-2");
        assert_eq!(
            rubicon.bid_request.imp[0].ext,
            Some(json!({"bidder": {"zoneId": 3}, "context": {"data": {"k": "v"}}}))
        );
        assert_eq!(
            rubicon.bid_request.user.as_ref().and_then(|u| u.buyeruid.clone()),
            None
        );
        assert_eq!(rubicon.labels.cookie_flag, CookieFlag::No);
        assert_eq!(
            rubicon.bid_request.user.as_ref().and_then(|u| u.ext.clone()),
            None,
            "buyeruids never leak"
        );
    }

    #[test]
    fn test_fan_out_routes_schains_and_shares_ext() {
        let settings = create_test_settings();
        let syncs: HashMap<String, String> = HashMap::new();
        let request = auction_request(two_bidder_request(), &syncs);

        let fanout = FanoutOrchestrator::new(&settings)
            .fan_out(&request)
            .expect("fan-out should succeed");

        let appnexus_source = bidder(&fanout, "appnexus").bid_request.source.clone();
        let appnexus_source = appnexus_source.expect("source set");
        assert_eq!(appnexus_source.tid.as_deref(), Some("tid-1"));
        assert_eq!(
            appnexus_source.ext.as_ref().and_then(|e| e.pointer("/schain/nodes/0/asi")),
            Some(&json!("an.com"))
        );
        let rubicon_source = bidder(&fanout, "rubicon").bid_request.source.clone();
        assert_eq!(
            rubicon_source.and_then(|s| s.ext).and_then(|e| e.pointer("/schain/complete").cloned()),
            Some(json!(0)),
            "wildcard chain applies"
        );

        for request in &fanout.bidder_requests {
            let ext = request.bid_request.ext.as_ref().expect("shared ext");
            assert!(ext.pointer("/prebid/schains").is_none());
            assert_eq!(ext.pointer("/prebid/aliases/districtm"), Some(&json!("appnexus")));
            assert_eq!(request.bid_request.extra.get("tmax"), Some(&json!(800)));
        }
        assert!(fanout.directives.targeting.is_some());
        assert!(fanout.errors.is_empty());
    }

    #[test]
    fn test_fan_out_wildcard_schain_declared_first() {
        let settings = create_test_settings();
        let syncs: HashMap<String, String> = HashMap::new();
        let mut raw = two_bidder_request();
        raw.ext = Some(json!({"prebid": {
            "aliases": {"districtm": "appnexus"},
            "schains": [
                {"bidders": ["*"], "schain": {"complete": 0, "nodes": [{"asi": "wild.com", "sid": "w"}], "ver": "1.0"}},
                {"bidders": ["districtm"], "schain": {"complete": 1, "nodes": [{"asi": "dm.com", "sid": "d"}], "ver": "1.0"}}
            ]
        }}));
        let request = auction_request(raw, &syncs);

        let fanout = FanoutOrchestrator::new(&settings)
            .fan_out(&request)
            .expect("fan-out should succeed");

        let asi = |name: &str| {
            bidder(&fanout, name)
                .bid_request
                .source
                .as_ref()
                .and_then(|s| s.ext.as_ref())
                .and_then(|e| e.pointer("/schain/nodes/0/asi"))
                .cloned()
        };
        assert_eq!(asi("districtm"), Some(json!("dm.com")));
        assert_eq!(asi("appnexus"), Some(json!("wild.com")));
        assert_eq!(asi("rubicon"), Some(json!("wild.com")));
    }

    #[test]
    fn test_fan_out_keeps_unmodelled_cache_and_targeting_keys() {
        let settings = create_test_settings();
        let syncs: HashMap<String, String> = HashMap::new();
        let mut raw = two_bidder_request();
        raw.ext = Some(json!({"prebid": {
            "aliases": {"districtm": "appnexus"},
            "cache": {"bids": {"ttlseconds": 300}},
            "targeting": {"pricegranularity": "dense", "includebrandcategory": {"primaryadserver": 1}}
        }}));
        let request = auction_request(raw, &syncs);

        let fanout = FanoutOrchestrator::new(&settings)
            .fan_out(&request)
            .expect("fan-out should succeed");

        for request in &fanout.bidder_requests {
            let ext = request.bid_request.ext.as_ref().expect("shared ext");
            assert_eq!(ext.pointer("/prebid/cache/bids/ttlseconds"), Some(&json!(300)));
            assert_eq!(
                ext.pointer("/prebid/targeting"),
                Some(&json!({"pricegranularity": "dense", "includebrandcategory": {"primaryadserver": 1}})),
                "no default targeting keys are added"
            );
        }
    }

    #[test]
    fn test_fan_out_does_not_mutate_input() {
        let settings = create_test_settings();
        let syncs = HashMap::from([("rubicon".to_string(), "rp".to_string())]);
        let request = auction_request(two_bidder_request(), &syncs);
        let before = request.bid_request.clone();

        let _ = FanoutOrchestrator::new(&settings)
            .fan_out(&request)
            .expect("fan-out should succeed");
        assert_eq!(request.bid_request, before);
    }

    #[test]
    fn test_fan_out_redacts_per_bidder_consent() {
        let settings = create_test_settings();
        let syncs = HashMap::from([
            ("appnexus".to_string(), "an".to_string()),
            ("rubicon".to_string(), "rp".to_string()),
        ]);
        let mut raw = two_bidder_request();
        raw.regs = Some(crate::openrtb::Regs {
            ext: Some(json!({"gdpr": 1})),
            ..Default::default()
        });
        raw.user = Some(crate::openrtb::User {
            id: Some("user-1".to_string()),
            ext: Some(json!({"consent": tcf_consent_string(&[1], &[32], false)})),
            ..Default::default()
        });
        let request = auction_request(raw, &syncs);

        let fanout = FanoutOrchestrator::new(&settings)
            .fan_out(&request)
            .expect("fan-out should succeed");

        assert!(fanout
            .privacy
            .redactions_for("appnexus")
            .is_empty());
        let appnexus = bidder(&fanout, "appnexus");
        assert_eq!(
            appnexus.bid_request.user.as_ref().and_then(|u| u.buyeruid.as_deref()),
            Some("an")
        );
        assert_eq!(
            appnexus.bid_request.device.as_ref().and_then(|d| d.ip.as_deref()),
            Some("198.51.100.23")
        );

        assert!(fanout
            .privacy
            .redactions_for("rubicon")
            .contains(&PersonalDataField::BuyerUid));
        let rubicon = bidder(&fanout, "rubicon");
        let user = rubicon.bid_request.user.as_ref().expect("user kept");
        assert_eq!(user.buyeruid, None);
        assert_eq!(user.id, None);
        let device = rubicon.bid_request.device.as_ref().expect("device kept");
        assert_eq!(device.ip.as_deref(), Some("198.51.100.0"));
        assert_eq!(device.ifa, None);
    }

    #[test]
    fn test_account_override_disables_gdpr_for_web() {
        let settings = create_test_settings();
        let syncs = HashMap::from([("rubicon".to_string(), "rp".to_string())]);
        let mut raw = two_bidder_request();
        raw.regs = Some(crate::openrtb::Regs {
            ext: Some(json!({"gdpr": 1})),
            ..Default::default()
        });
        let labels = RequestLabels {
            pub_id: "pub-1".to_string(),
            ..web_labels()
        };
        let request =
            AuctionRequest::new(raw, &syncs, labels).expect("request should be valid");

        let fanout = FanoutOrchestrator::new(&settings)
            .fan_out(&request)
            .expect("fan-out should succeed");
        assert!(!fanout.privacy.gdpr.enabled);
        assert_eq!(
            bidder(&fanout, "rubicon")
                .bid_request
                .user
                .as_ref()
                .and_then(|u| u.buyeruid.as_deref()),
            Some("rp")
        );
    }

    #[test]
    fn test_app_request_always_flags_cookie() {
        let settings = create_test_settings();
        let syncs: HashMap<String, String> = HashMap::new();
        let raw = bid_request(json!({
            "id": "app-req",
            "imp": [{"id": "1", "ext": {"ix": {"siteId": "9"}}}],
            "app": {"bundle": "com.example"}
        }));
        let labels = RequestLabels {
            source: DemandSource::App,
            rtype: RequestType::OpenRtb2App,
            ..web_labels()
        };
        let request = AuctionRequest::new(raw, &syncs, labels).expect("valid");

        let fanout = FanoutOrchestrator::new(&settings)
            .fan_out(&request)
            .expect("fan-out should succeed");
        let ix = bidder(&fanout, "ix");
        assert_eq!(ix.labels.cookie_flag, CookieFlag::Yes);
        assert_eq!(ix.labels.source, DemandSource::App);
        assert!(ix.bid_request.ext.is_none(), "no request ext to share");
    }

    #[test]
    fn test_fatal_errors_produce_no_requests() {
        let settings = create_test_settings();
        let syncs: HashMap<String, String> = HashMap::new();

        let mut duplicate_chain = two_bidder_request();
        duplicate_chain.ext = Some(json!({"prebid": {"schains": [
            {"bidders": ["rubicon"], "schain": {"complete": 1, "nodes": [], "ver": "1.0"}},
            {"bidders": ["rubicon"], "schain": {"complete": 1, "nodes": [], "ver": "1.0"}}
        ]}}));
        let request = auction_request(duplicate_chain, &syncs);
        let errors = FanoutOrchestrator::new(&settings)
            .fan_out(&request)
            .expect_err("duplicate chain is fatal");
        assert!(matches!(
            errors[0].current_context(),
            FanoutError::AmbiguousConfiguration { .. }
        ));

        let mut bad_privacy = two_bidder_request();
        bad_privacy.regs = Some(crate::openrtb::Regs {
            ext: Some(json!({"us_privacy": "bogus"})),
            ..Default::default()
        });
        let request = auction_request(bad_privacy, &syncs);
        assert!(FanoutOrchestrator::new(&settings).fan_out(&request).is_err());

        let mut bad_imp = two_bidder_request();
        bad_imp.imp[1].ext = Some(json!("oops"));
        let request = auction_request(bad_imp, &syncs);
        let errors = FanoutOrchestrator::new(&settings)
            .fan_out(&request)
            .expect_err("strict mode is fatal");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_lenient_mode_reports_skipped_imps() {
        let mut settings = create_test_settings();
        settings.auction.imp_ext_decode = ExtDecodeMode::Lenient;
        let syncs: HashMap<String, String> = HashMap::new();
        let mut raw = two_bidder_request();
        raw.imp[1].ext = Some(json!(["oops"]));
        let request = auction_request(raw, &syncs);

        let fanout = FanoutOrchestrator::new(&settings)
            .fan_out(&request)
            .expect("lenient mode should succeed");
        assert_eq!(fanout.bidder_requests.len(), 2);
        assert_eq!(fanout.errors.len(), 1);
    }
}
