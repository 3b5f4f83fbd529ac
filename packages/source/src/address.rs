//! Location cleaning for incident addresses.
//!
//! The case log reports locations as street addresses (`"123 MAIN ST"`) or
//! intersections (`"BROAD ST & ELMWOOD AVE"`, `"BROAD ST/ELMWOOD AVE"`).
//! Geocoders parse intersections better as `"X St at Y St"`, and the
//! address cache is keyed on the title-cased form, so every location is
//! normalized the same way before lookup.

use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Turns a raw JSON location into a normalized address.
///
/// Strings and numbers are stringified; `null`, booleans, arrays, objects
/// and blank strings have no usable location and return `None`.
#[must_use]
pub fn normalize_location_value(value: &serde_json::Value) -> Option<String> {
    let raw = location_text(value)?;
    normalize_location(&raw)
}

/// The source location as text, before cleaning.
#[must_use]
pub fn location_text(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Normalizes an address string.
///
/// `&` and `/` become the word `at`, runs of whitespace collapse to a
/// single space, and the result is title-cased. Returns `None` for blank
/// input.
#[must_use]
pub fn normalize_location(raw: &str) -> Option<String> {
    let replaced = raw.replace('&', " at ").replace('/', " at ");
    let collapsed = WHITESPACE_RE.replace_all(replaced.trim(), " ");
    if collapsed.is_empty() {
        return None;
    }
    Some(title_case(&collapsed))
}

/// Title-cases a string: every letter that follows a non-letter is
/// upper-cased and every other letter is lower-cased.
///
/// Digits count as non-letters, so `"1ST ST"` becomes `"1St St"`.
#[must_use]
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_ampersand_with_at() {
        assert_eq!(
            normalize_location("123 Main & Pine"),
            Some("123 Main At Pine".to_string())
        );
    }

    #[test]
    fn replaces_slash_with_at() {
        assert_eq!(
            normalize_location("BROAD ST/ELMWOOD AVE"),
            Some("Broad St At Elmwood Ave".to_string())
        );
    }

    #[test]
    fn unspaced_separator_matches_spaced_one() {
        assert_eq!(
            normalize_location("MAIN ST&ELM"),
            Some("Main St At Elm".to_string())
        );
        assert_eq!(
            normalize_location("MAIN ST&ELM"),
            normalize_location("MAIN ST & ELM")
        );
    }

    #[test]
    fn title_cases_upper_input() {
        assert_eq!(
            normalize_location("  100 N MAIN   ST "),
            Some("100 N Main St".to_string())
        );
    }

    #[test]
    fn title_case_after_digits_and_apostrophes() {
        assert_eq!(title_case("1ST ST"), "1St St");
        assert_eq!(title_case("o'neil st"), "O'Neil St");
    }

    #[test]
    fn blank_is_none() {
        assert_eq!(normalize_location("   "), None);
        assert_eq!(normalize_location(""), None);
    }

    #[test]
    fn json_values() {
        assert_eq!(
            normalize_location_value(&serde_json::json!("50 KENNEDY PLZ")),
            Some("50 Kennedy Plz".to_string())
        );
        assert_eq!(
            normalize_location_value(&serde_json::json!(42)),
            Some("42".to_string())
        );
        assert_eq!(normalize_location_value(&serde_json::Value::Null), None);
        assert_eq!(normalize_location_value(&serde_json::json!(["a"])), None);
    }
}
