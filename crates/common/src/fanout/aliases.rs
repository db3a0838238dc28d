//! Request-scoped bidder aliases.

use std::collections::{BTreeMap, BTreeSet};

use error_stack::Report;

use crate::bidders::{core_bidder_names, is_core_bidder};
use crate::error::FanoutError;

/// Maps a bidder name to its core bidder. Names that are not aliases
/// resolve to themselves.
#[must_use]
pub fn resolve_bidder<'a>(given: &'a str, aliases: &'a BTreeMap<String, String>) -> &'a str {
    aliases.get(given).map_or(given, String::as_str)
}

/// Every name a request may address: the core bidders plus its aliases.
#[must_use]
pub fn valid_bidder_names(aliases: &BTreeMap<String, String>) -> BTreeSet<String> {
    core_bidder_names()
        .into_iter()
        .map(str::to_string)
        .chain(aliases.keys().cloned())
        .collect()
}

/// Rejects aliases that point at unknown bidders or shadow themselves.
///
/// # Errors
///
/// Returns [`FanoutError::PolicyValidation`] naming the first bad alias.
pub fn validate_aliases(aliases: &BTreeMap<String, String>) -> Result<(), Report<FanoutError>> {
    for (alias, core) in aliases {
        if alias == core {
            return Err(Report::new(FanoutError::policy(format!(
                "request.ext.prebid.aliases.{alias} defines a no-op alias. Choose a different alias, or remove this entry"
            ))));
        }
        if !is_core_bidder(core) {
            return Err(Report::new(FanoutError::policy(format!(
                "request.ext.prebid.aliases.{alias} refers to unknown bidder: {core}"
            ))));
        }
    }
    Ok(())
}
