//! Buyer id resolution.
//!
//! Explicit ids sent in `user.ext.prebid.buyeruids` win over ids recovered
//! from the user-sync store. Each bidder gets its own user copy, so one
//! bidder's id never appears in another bidder's request.

use std::collections::BTreeMap;

use error_stack::{Report, ResultExt};
use serde::Deserialize;
use serde_json::Value;

use crate::error::FanoutError;
use crate::openrtb::{User, UserExt};
use crate::usersync::UserSyncStore;

/// Explicit buyer ids keyed by the bidder name the request used.
pub type ExplicitBuyerUids = BTreeMap<String, String>;

/// Pulls explicit buyer ids out of `user.ext.prebid`.
///
/// Returns the user every bidder starts from, with `ext.prebid` removed, and
/// the explicit ids. The input user is left untouched.
///
/// # Errors
///
/// Returns [`FanoutError::MalformedInput`] when `user.ext` is not a valid
/// user extension.
pub fn extract_buyer_uids(
    user: Option<&User>,
) -> Result<(Option<User>, ExplicitBuyerUids), Report<FanoutError>> {
    let Some(user) = user else {
        return Ok((None, ExplicitBuyerUids::new()));
    };
    let raw_ext = match &user.ext {
        None | Some(Value::Null) => return Ok((Some(user.clone()), ExplicitBuyerUids::new())),
        Some(raw) => raw,
    };

    let mut user_ext = UserExt::deserialize(raw_ext)
        .change_context(FanoutError::malformed("Error decoding request.user.ext"))?;
    let Some(prebid) = user_ext.prebid.take() else {
        return Ok((Some(user.clone()), ExplicitBuyerUids::new()));
    };

    if user_ext.consent.as_deref().is_some_and(str::is_empty) {
        user_ext.consent = None;
    }
    let keeps_ext = user_ext.consent.is_some()
        || user_ext.digitrust.is_some()
        || !user_ext.extra.is_empty();

    let mut template = user.clone();
    template.ext = if keeps_ext {
        Some(
            serde_json::to_value(&user_ext)
                .change_context(FanoutError::malformed("Error encoding request.user.ext"))?,
        )
    } else {
        None
    };

    Ok((Some(template), prebid.buyeruids))
}

/// The user to send to one bidder, and whether a prior sync existed for it.
///
/// The explicit id is looked up by the name the request used; the synced id
/// by the core bidder name.
#[must_use]
pub fn resolve_user(
    template: Option<&User>,
    given_bidder: &str,
    core_bidder: &str,
    explicit: &ExplicitBuyerUids,
    user_syncs: &dyn UserSyncStore,
) -> (Option<User>, bool) {
    let synced = user_syncs.lookup(core_bidder);
    let had_prior_sync = synced.is_some();

    let user = match explicit.get(given_bidder).cloned().or(synced) {
        Some(buyer_uid) => Some(copy_with_buyer_uid(template, buyer_uid)),
        None => template.cloned(),
    };
    (user, had_prior_sync)
}

fn copy_with_buyer_uid(user: Option<&User>, buyer_uid: String) -> User {
    match user {
        None => User {
            buyeruid: Some(buyer_uid),
            ..Default::default()
        },
        Some(user) if user.buyeruid.as_deref().is_none_or(str::is_empty) => User {
            buyeruid: Some(buyer_uid),
            ..user.clone()
        },
        Some(user) => user.clone(),
    }
}
