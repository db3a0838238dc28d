//! Privacy regimes and the personal data they protect.
//!
//! Each regime is resolved once per request into an [`EnabledPolicy`]: whether
//! the publisher has the regime switched on, plus the policy parsed from the
//! request signals. Per bidder, the three regimes are combined into the set of
//! [`PersonalDataField`]s to strip before the request leaves the server.

pub mod ccpa;
pub mod gdpr;
pub mod lmt;
pub mod scrub;

use std::collections::BTreeSet;

use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FanoutError;
use crate::openrtb::{BidRequest, RegsExt, RequestExt};
use crate::settings::{AccountConfig, IntegrationType, Settings};

use self::ccpa::CcpaPolicy;
use self::gdpr::GdprPolicy;
use self::lmt::LmtPolicy;

/// A category of personal data a regime can require to be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonalDataField {
    BuyerUid,
    UserId,
    UserDemographics,
    DeviceIds,
    DeviceIp,
    Geo,
}

impl PersonalDataField {
    pub const ALL: [Self; 6] = [
        Self::BuyerUid,
        Self::UserId,
        Self::UserDemographics,
        Self::DeviceIds,
        Self::DeviceIp,
        Self::Geo,
    ];
}

/// A parsed privacy regime.
pub trait PolicyEnforcer {
    /// Whether the request's signals call for enforcement against `bidder`.
    fn should_enforce(&self, bidder: &str) -> bool;

    /// Whether the regime covers `field` at all.
    fn redacts(&self, _field: PersonalDataField) -> bool {
        true
    }
}

/// A policy paired with the publisher's enabled flag. A disabled policy never
/// redacts anything.
#[derive(Debug, Clone, PartialEq)]
pub struct EnabledPolicy<P> {
    pub enabled: bool,
    pub policy: P,
}

impl<P: PolicyEnforcer> EnabledPolicy<P> {
    #[must_use]
    pub fn must_redact(&self, bidder: &str, field: PersonalDataField) -> bool {
        self.enabled && self.policy.redacts(field) && self.policy.should_enforce(bidder)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrivacyPolicies {
    pub gdpr: EnabledPolicy<GdprPolicy>,
    pub ccpa: EnabledPolicy<CcpaPolicy>,
    pub lmt: EnabledPolicy<LmtPolicy>,
}

impl PrivacyPolicies {
    /// Resolves all three regimes for one request.
    ///
    /// Each regime is enabled by the account override for the integration
    /// type, else the account-wide override, else the system default.
    ///
    /// # Errors
    ///
    /// Propagates malformed or invalid privacy signals from any regime.
    pub fn resolve(
        request: &BidRequest,
        ext: &RequestExt,
        settings: &Settings,
        account: Option<&AccountConfig>,
        integration_type: Option<IntegrationType>,
    ) -> Result<Self, Report<FanoutError>> {
        let regs_ext = parse_regs_ext(request)?;
        let aliases = &ext.prebid.aliases;

        let gdpr_override = account.and_then(|a| a.gdpr.enabled_for(integration_type));
        let ccpa_override = account.and_then(|a| a.ccpa.enabled_for(integration_type));
        let lmt_override = account.and_then(|a| a.lmt.enabled_for(integration_type));

        Ok(Self {
            gdpr: EnabledPolicy {
                enabled: gdpr_override.unwrap_or(settings.privacy.gdpr.enabled),
                policy: GdprPolicy::read_from_request(
                    request,
                    regs_ext.as_ref(),
                    aliases,
                    settings.privacy.gdpr.default_value,
                )?,
            },
            ccpa: EnabledPolicy {
                enabled: ccpa_override.unwrap_or(settings.privacy.ccpa.enforce),
                policy: CcpaPolicy::read_from_request(regs_ext.as_ref(), ext)?,
            },
            lmt: EnabledPolicy {
                enabled: lmt_override.unwrap_or(settings.privacy.lmt.enforce),
                policy: LmtPolicy::read_from_request(request),
            },
        })
    }

    /// Union of the fields every enabled regime requires removed for `bidder`.
    #[must_use]
    pub fn redactions_for(&self, bidder: &str) -> BTreeSet<PersonalDataField> {
        PersonalDataField::ALL
            .into_iter()
            .filter(|&field| {
                self.gdpr.must_redact(bidder, field)
                    || self.ccpa.must_redact(bidder, field)
                    || self.lmt.must_redact(bidder, field)
            })
            .collect()
    }
}

/// Decodes `regs.ext`, if present.
fn parse_regs_ext(request: &BidRequest) -> Result<Option<RegsExt>, Report<FanoutError>> {
    match request.regs.as_ref().and_then(|regs| regs.ext.as_ref()) {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => RegsExt::deserialize(raw)
            .map(Some)
            .change_context(FanoutError::malformed("request.regs.ext is invalid")),
    }
}
