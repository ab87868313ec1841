//! Count extraction from scraped widget text.

use once_cell::sync::Lazy;
use regex::Regex;

static FIRST_INTEGER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9]+").unwrap_or_else(|error| panic!("invalid count pattern: {error}"))
});

/// First run of digits in a scraped count label, e.g. `"12 comments"` → 12.
#[must_use]
pub fn first_integer(text: &str) -> Option<u64> {
    FIRST_INTEGER
        .find(text)
        .and_then(|found| found.as_str().parse().ok())
}
