//! ISO 8601 duration parsing and the two business filters derived from it.
//!
//! YouTube reports `contentDetails.duration` as `PT#H#M#S` with any subset
//! of components present. Unparseable input deliberately maps to zero
//! seconds: misclassifying a video as "not short" only means it gets
//! processed, while an error here would drop it silently.

use once_cell::sync::Lazy;
use regex::Regex;

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?").expect("valid duration regex"));

const SHORT_MAX_SECS: u64 = 60;
const OVER_LENGTH_SECS: u64 = 360;

/// Total seconds encoded in an ISO 8601 duration; 0 when nothing parses.
pub fn parse_seconds(raw: &str) -> u64 {
    let Some(caps) = DURATION_RE.captures(raw) else {
        return 0;
    };
    let component = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    component(1) * 3600 + component(2) * 60 + component(3)
}

/// A video of at most 60 seconds is a Short and is never downloaded.
pub fn is_short(raw: &str) -> bool {
    parse_seconds(raw) <= SHORT_MAX_SECS
}

/// Videos longer than 6 minutes are skipped as well. Independent of
/// [`is_short`]; the two are separate filters, not a 3-way classification.
pub fn is_over_length(raw: &str) -> bool {
    parse_seconds(raw) > OVER_LENGTH_SECS
}
