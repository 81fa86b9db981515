//! Locale codes used by layout and block translations (`en`, `hr_HR`).

use std::sync::LazyLock;

use regex::Regex;

static LOCALE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2,3}(_[A-Z]{2})?$").expect("valid regex"));

/// Whether `locale` is a well-formed locale code.
pub fn is_valid_locale(locale: &str) -> bool {
    LOCALE_RE.is_match(locale)
}
