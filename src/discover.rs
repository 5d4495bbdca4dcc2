use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;

use crate::config::Settings;
use crate::expand::{expand, Accumulator, ExpandConfig, ExpandStats, PrefixQuery};
use crate::parse::{sort_house_numbers, Suggestion};
use crate::request::SuggestionSource;
use crate::{info_time, Error, Result};

/// First letters of German street names.
pub const STREET_ROOTS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÜ";
/// Letters appended to a saturated street prefix.
pub const STREET_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyzäöüß";
/// Leading digit of a house number. Zero never leads and the empty prefix returns nothing.
pub const NUMBER_ROOTS: &str = "123456789";
pub const NUMBER_ALPHABET: &str = "0123456789";

/// Letter pairs that don't occur in German street names.
///
/// Only a heuristic to save queries: a wrong entry silently loses streets, so
/// `--exhaustive` turns it off.
pub fn impossible_after(prefix: &str, next: char) -> bool {
    let Some(last) = prefix.chars().last() else {
        return false;
    };
    let last = last.to_lowercase().next().unwrap_or(last);
    let blocked = match last {
        'b' | 'd' | 'k' => "bcdfgjkpqvwxz",
        'c' => "bcdfgjpqvwxyz",
        'f' => "bcdgjkpqvwxz",
        'g' => "bcdfjkpqvwxz",
        'p' => "bcdgjkpqvwxz",
        't' => "bcdfgjkpqvwx",
        'x' => return true,
        'q' => return next != 'u',
        _ => return false,
    };
    blocked.contains(next)
}

/// Street-name endpoint seen as a [`PrefixQuery`].
pub struct StreetPrefixes<S: ?Sized>(pub Arc<S>);

#[async_trait]
impl<S> PrefixQuery for StreetPrefixes<S>
where
    S: SuggestionSource + ?Sized,
{
    async fn query(&self, prefix: &str) -> Result<Vec<Suggestion>> {
        self.0.streets(prefix).await
    }
}

/// House-number endpoint for one street seen as a [`PrefixQuery`].
pub struct NumberPrefixes<S: ?Sized> {
    pub source: Arc<S>,
    pub street: String,
}

#[async_trait]
impl<S> PrefixQuery for NumberPrefixes<S>
where
    S: SuggestionSource + ?Sized,
{
    async fn query(&self, prefix: &str) -> Result<Vec<Suggestion>> {
        if prefix.is_empty() {
            return Err(Error::EmptyNumberPrefix(self.street.clone()));
        }
        self.source.house_numbers(&self.street, prefix).await
    }
}

pub fn street_config(settings: &Settings) -> ExpandConfig {
    let skip = settings.prune.then_some(impossible_after as fn(&str, char) -> bool);
    ExpandConfig::new(STREET_ROOTS.chars().map(String::from), STREET_ALPHABET)
        .with_threshold(settings.threshold)
        .with_max_in_flight(settings.max_in_flight)
        .with_skip(skip)
}

pub fn number_config(settings: &Settings) -> ExpandConfig {
    ExpandConfig::new(NUMBER_ROOTS.chars().map(String::from), NUMBER_ALPHABET)
        .with_threshold(settings.threshold)
        .with_max_in_flight(settings.max_in_flight)
}

/// Expands every street root letter in turn into `acc`.
///
/// Prefixes already in `acc.completed` are not queried again. Roots that fail don't
/// stop the others; their prefixes come back together as [`Error::Incomplete`].
pub async fn discover_streets<S>(
    source: Arc<S>,
    settings: &Settings,
    acc: &mut Accumulator,
) -> Result<ExpandStats>
where
    S: SuggestionSource + ?Sized,
{
    let query = Arc::new(StreetPrefixes(source));
    let config = street_config(settings);
    let mut total = ExpandStats::default();
    let mut failed = Vec::new();

    for root in &config.roots {
        let start_time = Local::now();
        let root_config = ExpandConfig {
            roots: vec![root.clone()],
            ..config.clone()
        };
        info_time!("Starting collection for letter: {root}");

        match expand(query.clone(), &root_config, acc).await {
            Ok(stats) => add_stats(&mut total, stats),
            Err(Error::Incomplete { failed: f }) => {
                total.failed += f.len();
                failed.extend(f);
            }
            Err(err) => return Err(err),
        }
        info_time!(
            start_time,
            "Current total: {} streets, {} completed queries",
            acc.values.len(),
            acc.completed.len()
        );
    }

    if failed.is_empty() {
        Ok(total)
    } else {
        Err(Error::Incomplete { failed })
    }
}

/// Every house number of `street`, naturally sorted.
pub async fn discover_house_numbers<S>(
    source: Arc<S>,
    street: &str,
    settings: &Settings,
) -> Result<Vec<String>>
where
    S: SuggestionSource + ?Sized,
{
    let query = Arc::new(NumberPrefixes {
        source,
        street: street.to_string(),
    });
    let mut acc = Accumulator::default();

    match expand(query, &number_config(settings), &mut acc).await {
        Ok(_) => Ok(sort_house_numbers(acc.values)),
        Err(Error::Incomplete { failed }) => Err(Error::Incomplete {
            failed: failed.into_iter().map(|p| format!("{street}#{p}")).collect(),
        }),
        Err(err) => Err(err),
    }
}

fn add_stats(total: &mut ExpandStats, stats: ExpandStats) {
    total.queried += stats.queried;
    total.skipped_complete += stats.skipped_complete;
    total.pruned += stats.pruned;
    total.saturated += stats.saturated;
    total.failed += stats.failed;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_impossible_pairs() {
        assert!(impossible_after("Q", 'a'));
        assert!(!impossible_after("Q", 'u'));
        assert!(impossible_after("Ab", 'b'));
        assert!(impossible_after("Ax", 'e'));
        assert!(!impossible_after("St", 'r'));
        assert!(!impossible_after("Sc", 'h'));
        assert!(!impossible_after("", 'x'));
        assert!(!impossible_after("Mü", 'h'));
    }

    #[test]
    fn test_street_alphabet_has_german_letters() {
        for c in ['ä', 'ö', 'ü', 'ß'] {
            assert!(STREET_ALPHABET.contains(c));
        }
        assert_eq!(STREET_ROOTS.chars().count(), 29);
    }

    #[test]
    fn test_street_config_pruning_toggle() {
        let pruned = street_config(&Settings::default());
        assert!(pruned.skip.is_some());
        let exhaustive = street_config(&Settings {
            prune: false,
            ..Settings::default()
        });
        assert!(exhaustive.skip.is_none());
        assert_eq!(exhaustive.roots.len(), 29);
    }

    /// One street with fixed house numbers, recording every number prefix asked for.
    struct OneStreet {
        numbers: Vec<String>,
        asked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SuggestionSource for OneStreet {
        async fn streets(&self, _prefix: &str) -> Result<Vec<Suggestion>> {
            Ok(Vec::new())
        }

        async fn house_numbers(&self, _street: &str, prefix: &str) -> Result<Vec<Suggestion>> {
            self.asked.lock().unwrap().push(prefix.to_string());
            Ok(self
                .numbers
                .iter()
                .filter(|n| n.starts_with(prefix))
                .take(12)
                .map(|n| Suggestion::new(n.as_str()))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_house_numbers_complete_and_sorted() {
        let mut numbers: Vec<String> = (1..=30).map(|n| n.to_string()).collect();
        numbers.extend(["30A".to_string(), "2/1".to_string()]);
        let source = Arc::new(OneStreet {
            numbers: numbers.clone(),
            asked: Mutex::new(Vec::new()),
        });

        let settings = Settings::default();
        let got = discover_house_numbers(source.clone(), "Hauptstätter Straße", &settings)
            .await
            .unwrap();

        assert_eq!(got.len(), numbers.len());
        assert_eq!(&got[..4], &["1", "2", "2/1", "3"]);
        assert_eq!(got.last().map(String::as_str), Some("30A"));

        let asked = source.asked.lock().unwrap();
        assert!(asked.iter().all(|p| !p.is_empty()));
        // "2" saturates with 2, 2/1 and 20..29
        assert!(asked.contains(&"20".to_string()));
        assert!(!asked.contains(&"10".to_string()));
    }

    #[tokio::test]
    async fn test_number_query_rejects_empty_prefix() {
        let query = NumberPrefixes {
            source: Arc::new(OneStreet {
                numbers: vec!["1".into()],
                asked: Mutex::new(Vec::new()),
            }),
            street: "Marktplatz".into(),
        };
        let err = query.query("").await.unwrap_err();
        assert!(matches!(err, Error::EmptyNumberPrefix(s) if s == "Marktplatz"));
        assert!(query.source.asked.lock().unwrap().is_empty());
    }
}
