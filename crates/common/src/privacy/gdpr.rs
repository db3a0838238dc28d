//! Regional consent: the `regs.ext.gdpr` signal and IAB TCF v2 consent strings.

use std::collections::{BTreeMap, BTreeSet};

use error_stack::{Report, ResultExt};
use iab_gpp::sections::tcfeuv2::TcfEuV2;
use serde_json::Value;

use crate::bidders::gvl_vendor_id;
use crate::error::FanoutError;
use crate::fanout::aliases::resolve_bidder;
use crate::openrtb::{BidRequest, RegsExt};

use super::{PersonalDataField, PolicyEnforcer};

/// Storage and access of information on a device.
const PURPOSE_STORAGE: u16 = 1;

/// The parts of a TCF v2 consent string that drive enforcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcfConsent {
    purposes: BTreeSet<u16>,
    vendors: BTreeSet<u16>,
}

impl TcfConsent {
    /// Decodes a TCF v2 consent string, keeping only the core segment's
    /// purpose and vendor consents.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::MalformedInput`] when the string is not a
    /// decodable version 2 consent string.
    pub fn parse(consent: &str) -> Result<Self, Report<FanoutError>> {
        let tcf = consent
            .parse::<TcfEuV2>()
            .change_context(FanoutError::malformed("TCF consent string could not be decoded"))?;

        Ok(Self {
            purposes: tcf.core.purpose_consents,
            vendors: tcf.core.vendor_consents,
        })
    }

    /// Whether consent was given for a purpose (1 to 24).
    #[must_use]
    pub fn purpose_consented(&self, purpose: u16) -> bool {
        self.purposes.contains(&purpose)
    }

    #[must_use]
    pub fn vendor_consented(&self, vendor_id: u16) -> bool {
        self.vendors.contains(&vendor_id)
    }
}

/// The `regs.ext.gdpr` signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GdprSignal {
    No,
    Yes,
    /// The request did not say; the configured default decides.
    Ambiguous,
}

/// Reads `regs.ext.gdpr`.
///
/// # Errors
///
/// Returns [`FanoutError::PolicyValidation`] when the signal is anything other
/// than the integer 0 or 1.
pub fn read_signal(regs_ext: Option<&RegsExt>) -> Result<GdprSignal, Report<FanoutError>> {
    match regs_ext.and_then(|ext| ext.gdpr.as_ref()) {
        None | Some(Value::Null) => Ok(GdprSignal::Ambiguous),
        Some(value) => match value.as_u64() {
            Some(0) => Ok(GdprSignal::No),
            Some(1) => Ok(GdprSignal::Yes),
            _ => Err(Report::new(FanoutError::policy(format!(
                "request.regs.ext.gdpr must be either 0 or 1, got {value}"
            )))),
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GdprPolicy {
    pub signal: GdprSignal,
    /// Whether the regime applies to this request after the default is
    /// applied to an ambiguous signal.
    pub applies: bool,
    pub consent: Option<TcfConsent>,
    aliases: BTreeMap<String, String>,
}

impl GdprPolicy {
    /// Reads the signal and consent string from the request.
    ///
    /// # Errors
    ///
    /// Fails on an invalid signal, a non-string `user.ext.consent`, or a
    /// malformed consent string.
    pub fn read_from_request(
        request: &BidRequest,
        regs_ext: Option<&RegsExt>,
        aliases: &BTreeMap<String, String>,
        default_value: u8,
    ) -> Result<Self, Report<FanoutError>> {
        let signal = read_signal(regs_ext)?;
        let applies = match signal {
            GdprSignal::Yes => true,
            GdprSignal::No => false,
            GdprSignal::Ambiguous => default_value == 1,
        };

        let consent = match request
            .user
            .as_ref()
            .and_then(|user| user.ext.as_ref())
            .and_then(|ext| ext.get("consent"))
        {
            None | Some(Value::Null) => None,
            Some(Value::String(consent)) if consent.is_empty() => None,
            Some(Value::String(consent)) => Some(TcfConsent::parse(consent)?),
            Some(other) => {
                return Err(Report::new(FanoutError::malformed(format!(
                    "request.user.ext.consent must be a string, got {other}"
                ))))
            }
        };

        Ok(Self {
            signal,
            applies,
            consent,
            aliases: aliases.clone(),
        })
    }
}

impl PolicyEnforcer for GdprPolicy {
    fn should_enforce(&self, bidder: &str) -> bool {
        if !self.applies {
            return false;
        }
        let Some(consent) = &self.consent else {
            return true;
        };
        let Some(vendor_id) = gvl_vendor_id(resolve_bidder(bidder, &self.aliases)) else {
            return true;
        };
        !(consent.purpose_consented(PURPOSE_STORAGE) && consent.vendor_consented(vendor_id))
    }

    fn redacts(&self, field: PersonalDataField) -> bool {
        field != PersonalDataField::UserDemographics
    }
}
