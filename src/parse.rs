use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One autocomplete entry. The endpoints return the same text in both fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub value: String,
    pub data: String,
}

impl Suggestion {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            value: text.clone(),
            data: text,
        }
    }

    /// The underlying value, falling back to the display value when it is empty.
    pub fn text(&self) -> &str {
        if self.data.is_empty() {
            &self.value
        } else {
            &self.data
        }
    }
}

/// Decodes a `{"suggestions": [{"value": .., "data": ..}, ..]}` body.
///
/// Returns `None` when the body isn't JSON or has no `suggestions` array.
/// Entries without a usable `data` field are skipped.
pub(crate) fn parse_suggestions(body: &str) -> Option<Vec<Suggestion>> {
    let doc: Value = serde_json::from_str(body).ok()?;
    let items = doc.get("suggestions")?.as_array()?;

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(data) = item.get("data").and_then(scalar_text) else {
            continue;
        };
        let value = item
            .get("value")
            .and_then(scalar_text)
            .unwrap_or_else(|| data.clone());
        out.push(Suggestion { value, data });
    }
    Some(out)
}

#[inline]
fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Run<'a> {
    Digits(&'a str),
    Text(&'a str),
}

/// Splits a string into alternating runs of ASCII digits and everything else.
fn runs(s: &str) -> impl Iterator<Item = Run<'_>> {
    let mut rest = s;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digits)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (run, tail) = rest.split_at(end);
        rest = tail;
        Some(if digits { Run::Digits(run) } else { Run::Text(run) })
    })
}

fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
        .then_with(|| a.len().cmp(&b.len()))
}

/// Natural ordering for house numbers: digit runs compare by value, other runs
/// lexically, so `"2" < "10"` and `"30" < "30A" < "31"`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = runs(a);
    let mut right = runs(b);
    loop {
        let ord = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(Run::Digits(x)), Some(Run::Digits(y))) => cmp_digit_runs(x, y),
            (Some(Run::Text(x)), Some(Run::Text(y))) => x.cmp(y),
            (Some(Run::Digits(_)), Some(Run::Text(_))) => Ordering::Less,
            (Some(Run::Text(_)), Some(Run::Digits(_))) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

/// Deduplicates and sorts house numbers in natural order.
pub fn sort_house_numbers<I>(numbers: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = numbers.into_iter().collect();
    out.sort_unstable_by(|a, b| natural_cmp(a, b));
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_sort_basic() {
        let sorted = sort_house_numbers(["10", "2", "30A", "1"].map(String::from));
        assert_eq!(sorted, vec!["1", "2", "10", "30A"]);
    }

    #[test]
    fn test_suffix_sorts_after_plain_number() {
        let sorted = sort_house_numbers(["31", "30A", "30", "30/1", "3"].map(String::from));
        assert_eq!(sorted, vec!["3", "30", "30/1", "30A", "31"]);
    }

    #[test]
    fn test_sort_dedups() {
        let sorted = sort_house_numbers(["4", "4", "4a", "4"].map(String::from));
        assert_eq!(sorted, vec!["4", "4a"]);
    }

    #[test]
    fn test_long_digit_runs_do_not_overflow() {
        let big = "123456789012345678901234567890";
        assert_eq!(natural_cmp("9", big), Ordering::Less);
        assert_eq!(natural_cmp("007", "7"), Ordering::Greater);
        assert_eq!(natural_cmp("07", "8"), Ordering::Less);
    }

    #[test]
    fn test_free_text_after_numbers() {
        assert_eq!(natural_cmp("12", "Garage"), Ordering::Less);
        assert_eq!(natural_cmp("12 Hinterhaus", "12"), Ordering::Greater);
    }

    #[test]
    fn test_parse_suggestions() {
        let body = r#"{"suggestions":[
            {"value":"Königstraße","data":"Königstraße"},
            {"value":"Kronenstraße"},
            {"value":"12","data":12},
            "garbage"
        ]}"#;
        let parsed = parse_suggestions(body).unwrap();
        let texts: Vec<&str> = parsed.iter().map(Suggestion::text).collect();
        assert_eq!(texts, vec!["Königstraße", "12"]);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_suggestions("<html>busy</html>").is_none());
        assert!(parse_suggestions(r#"{"query":"A"}"#).is_none());
        assert!(parse_suggestions(r#"{"suggestions":{}}"#).is_none());
        assert_eq!(parse_suggestions(r#"{"suggestions":[]}"#), Some(vec![]));
    }
}
