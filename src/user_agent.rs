//! Shared User-Agent string for marketplace HTTP traffic.
//!
//! Single source for the UA format so every outbound request identifies the
//! tool the same way.

/// Default User-Agent for marketplace requests.
#[must_use]
pub(crate) fn default_marketplace_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("dataset-search/{version} (dataset-discovery)")
}
