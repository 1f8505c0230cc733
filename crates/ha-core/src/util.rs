//! Text and number helpers shared by the integrations

use regex::Regex;
use std::sync::OnceLock;

fn non_slug_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid"))
}

/// Slugify text into an identifier-safe string
///
/// `"Disk Use (%) /home"` becomes `"disk_use_home"`.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    non_slug_chars()
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// Title-case text the way the vendor names are displayed
///
/// The first letter of every run of letters is upper-cased and the rest are
/// lower-cased, so `"o'brien's DOOR"` becomes `"O'Brien'S Door"`.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }
    out
}

/// Round to a number of decimal places
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}
