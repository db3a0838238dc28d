//! Regional opt-out: the US privacy string and the no-sale bidder list.

use std::collections::BTreeSet;

use error_stack::Report;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::NOSALE_ALL_BIDDERS;
use crate::error::FanoutError;
use crate::fanout::aliases::valid_bidder_names;
use crate::openrtb::{RegsExt, RequestExt};

use super::PolicyEnforcer;

static US_PRIVACY_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^1[YNyn-][YNyn-][YNyn-]$").expect("US privacy regex should compile")
});

/// A validated US privacy string: version, notice, opt-out, LSPA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsPrivacy {
    pub notice: char,
    pub opt_out: char,
    pub lspa: char,
}

impl UsPrivacy {
    /// Parses a US privacy string. An empty string means no signal.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::PolicyValidation`] when the string is not of the
    /// form `1[YN-][YN-][YN-]`.
    pub fn parse(value: &str) -> Result<Option<Self>, Report<FanoutError>> {
        if value.is_empty() {
            return Ok(None);
        }
        if !US_PRIVACY_FORMAT.is_match(value) {
            return Err(Report::new(FanoutError::policy(format!(
                "request.regs.ext.us_privacy is invalid: {value:?}"
            ))));
        }

        let mut chars = value.chars().skip(1).map(|c| c.to_ascii_uppercase());
        let (Some(notice), Some(opt_out), Some(lspa)) = (chars.next(), chars.next(), chars.next())
        else {
            return Err(Report::new(FanoutError::policy(format!(
                "request.regs.ext.us_privacy is invalid: {value:?}"
            ))));
        };
        Ok(Some(Self {
            notice,
            opt_out,
            lspa,
        }))
    }

    #[must_use]
    pub fn opted_out(&self) -> bool {
        self.opt_out == 'Y'
    }
}

/// Bidders exempted from opt-out enforcement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NoSale {
    #[default]
    Empty,
    All,
    Bidders(BTreeSet<String>),
}

impl NoSale {
    /// Validates `ext.prebid.nosale` against the bidders the request may name.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::PolicyValidation`] for unknown bidders or when
    /// `"*"` is combined with other entries.
    pub fn from_ext(ext: &RequestExt) -> Result<Self, Report<FanoutError>> {
        let entries = &ext.prebid.nosale;
        if entries.is_empty() {
            return Ok(Self::Empty);
        }
        if entries.iter().any(|entry| entry == NOSALE_ALL_BIDDERS) {
            if entries.len() > 1 {
                return Err(Report::new(FanoutError::policy(
                    "request.ext.prebid.nosale is invalid: can only specify all bidders if no other bidders are provided",
                )));
            }
            return Ok(Self::All);
        }

        let valid = valid_bidder_names(&ext.prebid.aliases);
        if let Some(unknown) = entries.iter().find(|entry| !valid.contains(*entry)) {
            return Err(Report::new(FanoutError::policy(format!(
                "request.ext.prebid.nosale is invalid: unrecognized bidder '{unknown}'"
            ))));
        }
        Ok(Self::Bidders(entries.iter().cloned().collect()))
    }

    #[must_use]
    pub fn exempts(&self, bidder: &str) -> bool {
        match self {
            Self::Empty => false,
            Self::All => true,
            Self::Bidders(bidders) => bidders.contains(bidder),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CcpaPolicy {
    pub consent: Option<UsPrivacy>,
    pub no_sale: NoSale,
}

impl CcpaPolicy {
    /// # Errors
    ///
    /// Fails when the US privacy string or the no-sale list is invalid.
    pub fn read_from_request(
        regs_ext: Option<&RegsExt>,
        ext: &RequestExt,
    ) -> Result<Self, Report<FanoutError>> {
        let consent = match regs_ext.and_then(|regs| regs.us_privacy.as_deref()) {
            Some(value) => UsPrivacy::parse(value)?,
            None => None,
        };
        Ok(Self {
            consent,
            no_sale: NoSale::from_ext(ext)?,
        })
    }
}

impl PolicyEnforcer for CcpaPolicy {
    fn should_enforce(&self, bidder: &str) -> bool {
        self.consent.is_some_and(|consent| consent.opted_out()) && !self.no_sale.exempts(bidder)
    }
}
