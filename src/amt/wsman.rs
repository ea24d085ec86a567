//! Targeted tag extraction for WS-Man response bodies.
//!
//! The payload shapes are fixed and controlled, so a full XML parser is
//! not warranted; a single-tag regex match is enough. An absent tag
//! always degrades to a sentinel instead of an error.

use std::sync::LazyLock;

use regex::Regex;

use super::catalog::{STATE_PARSE_FAILURE, STATE_TAG_MISSING};

static ENUM_CONTEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    // ...<g:EnumerationContext>06000000-0000-...</g:EnumerationContext>...
    Regex::new(r"<(?:\w+:)?EnumerationContext>([^<]+)</(?:\w+:)?EnumerationContext>").unwrap()
});

static POWER_STATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    // ...<h:PowerState>8</h:PowerState>...
    Regex::new(r"<(?:\w+:)?PowerState>([^<]+)</(?:\w+:)?PowerState>").unwrap()
});

/// Extract the opaque enumeration-context token from a step-one response.
///
/// Returns an empty string when the tag is absent; the server will reject
/// the follow-up request, which is a normal failure path.
pub fn enumeration_context(xml: &str) -> &str {
    match ENUM_CONTEXT_RE.captures(xml) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => {
            log::warn!("no EnumerationContext in response body: {}", xml);
            ""
        }
    }
}

/// Extract the numeric `<PowerState>` from a step-two response.
///
/// Non-numeric tag content yields -1, a missing tag -2. Both are distinct
/// from the transport-error code 16.
pub fn power_state(xml: &str) -> i32 {
    match POWER_STATE_RE.captures(xml) {
        Some(caps) => caps
            .get(1)
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .unwrap_or(STATE_PARSE_FAILURE),
        None => {
            log::warn!("no PowerState in response body: {}", xml);
            STATE_TAG_MISSING
        }
    }
}

/// Substitute the enumeration context into a step-two template
pub fn fill_enum_context(template: &str, token: &str) -> String {
    template.replace("{enum_context}", token)
}
