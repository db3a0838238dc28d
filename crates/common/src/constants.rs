/// Shared directives key inside `imp.ext` and `request.ext`.
pub const PREBID_EXT_KEY: &str = "prebid";
/// First-party data context key inside `imp.ext`.
pub const FIRST_PARTY_DATA_CONTEXT_EXT_KEY: &str = "context";
/// Canonical key carrying a bidder's own parameters in a sanitized `imp.ext`.
pub const BIDDER_EXT_KEY: &str = "bidder";
/// Key carrying the resolved supply chain in `source.ext`.
pub const SCHAIN_EXT_KEY: &str = "schain";

/// Supply-chain declaration that applies to every bidder without its own chain.
pub const SCHAIN_WILDCARD: &str = "*";
/// No-sale list entry that exempts every bidder.
pub const NOSALE_ALL_BIDDERS: &str = "*";

/// Name of the cookie carrying previously synced buyer ids.
pub const UIDS_COOKIE_NAME: &str = "uids";

/// Environment variable prefix used for settings overrides.
pub const ENVIRONMENT_VARIABLE_PREFIX: &str = "PREBID_FANOUT";
/// Separator between nested settings keys in environment overrides.
pub const ENVIRONMENT_VARIABLE_SEPARATOR: &str = "__";
