//! Lookup of buyer ids synced in earlier sessions.
//!
//! The fan-out core only ever reads this store. [`UidsCookie`] recovers the
//! ids from the `uids` cookie; a plain map works for tests and embedding.

use std::collections::{BTreeMap, HashMap};

use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use cookie::Cookie;
use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::constants::UIDS_COOKIE_NAME;
use crate::error::FanoutError;

/// Read-only access to previously synced buyer ids, keyed by core bidder.
pub trait UserSyncStore: Send + Sync {
    fn lookup(&self, core_bidder: &str) -> Option<String>;
}

impl UserSyncStore for HashMap<String, String> {
    fn lookup(&self, core_bidder: &str) -> Option<String> {
        self.get(core_bidder).cloned()
    }
}

impl UserSyncStore for BTreeMap<String, String> {
    fn lookup(&self, core_bidder: &str) -> Option<String> {
        self.get(core_bidder).cloned()
    }
}

#[derive(Debug, Deserialize)]
struct RawUidsCookie {
    #[serde(default, rename = "tempUIDs")]
    temp_uids: HashMap<String, RawUid>,
    #[serde(default)]
    optout: bool,
}

#[derive(Debug, Deserialize)]
struct RawUid {
    #[serde(default)]
    uid: String,
    #[serde(default)]
    expires: Option<String>,
}

/// Buyer ids carried by the `uids` cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UidsCookie {
    uids: HashMap<String, String>,
    opted_out: bool,
}

impl UidsCookie {
    /// Reads the `uids` cookie out of a `Cookie` request header.
    ///
    /// A missing or unreadable cookie yields an empty store.
    #[must_use]
    pub fn from_header(cookie_header: &str, now: DateTime<Utc>) -> Self {
        let value = Cookie::split_parse(cookie_header)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == UIDS_COOKIE_NAME)
            .map(|cookie| cookie.value().to_string());

        let Some(value) = value else {
            log::debug!("No {UIDS_COOKIE_NAME} cookie present");
            return Self::default();
        };

        match Self::decode(&value, now) {
            Ok(cookie) => cookie,
            Err(report) => {
                log::warn!("Ignoring unreadable {UIDS_COOKIE_NAME} cookie: {report:?}");
                Self::default()
            }
        }
    }

    /// Decodes a cookie value: base64 (standard or URL-safe) wrapped JSON.
    ///
    /// Expired entries and empty ids are dropped. An opted-out cookie keeps
    /// no ids.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::MalformedInput`] when the value is not base64 or
    /// the payload is not the expected JSON.
    pub fn decode(value: &str, now: DateTime<Utc>) -> Result<Self, Report<FanoutError>> {
        let bytes = URL_SAFE
            .decode(value)
            .or_else(|_| URL_SAFE_NO_PAD.decode(value))
            .or_else(|_| STANDARD.decode(value))
            .change_context(FanoutError::malformed("uids cookie is not valid base64"))?;
        let raw: RawUidsCookie = serde_json::from_slice(&bytes)
            .change_context(FanoutError::malformed("uids cookie is not valid JSON"))?;

        if raw.optout {
            return Ok(Self {
                uids: HashMap::new(),
                opted_out: true,
            });
        }

        let uids = raw
            .temp_uids
            .into_iter()
            .filter(|(_, entry)| !entry.uid.is_empty())
            .filter(|(bidder, entry)| match entry.expires.as_deref() {
                None => true,
                Some(expires) => match DateTime::parse_from_rfc3339(expires) {
                    Ok(expires) => expires.with_timezone(&Utc) > now,
                    Err(err) => {
                        log::debug!("Dropping uid for {bidder} with bad expiry {expires:?}: {err}");
                        false
                    }
                },
            })
            .map(|(bidder, entry)| (bidder, entry.uid))
            .collect();

        Ok(Self {
            uids,
            opted_out: false,
        })
    }

    #[must_use]
    pub fn opted_out(&self) -> bool {
        self.opted_out
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.uids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }
}

impl UserSyncStore for UidsCookie {
    fn lookup(&self, core_bidder: &str) -> Option<String> {
        self.uids.get(core_bidder).cloned()
    }
}
