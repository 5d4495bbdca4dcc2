use std::sync::Arc;

use chrono::Local;

use crate::config::Settings;
use crate::discover::{discover_house_numbers, discover_streets};
use crate::expand::Accumulator;
use crate::request::{HttpSource, SuggestionSource};
use crate::store::Store;
use crate::{info_time, warn_time, Error, Result};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub streets: usize,
    pub completed_prefixes: usize,
    pub streets_with_numbers: usize,
    pub house_numbers: usize,
    /// Streets whose house numbers were attempted during this run.
    pub processed_streets: usize,
}

/// Crawls the configured endpoints into the configured data directory.
pub async fn process_city(settings: &Settings) -> Result<RunSummary> {
    let source = Arc::new(HttpSource::new(settings)?);
    let store = Store::new(&settings.data_dir);
    run(source, &store, settings).await
}

/// Loads the checkpoint, finishes street discovery if needed, then collects the house
/// numbers of every street that has none yet.
///
/// Failed subtrees don't stop the run. They are left out of the checkpoint so the next
/// run retries them, and the run ends with [`Error::Incomplete`]. Storage errors abort
/// right away, as do settings that fail [`Settings::check`].
pub async fn run<S>(source: Arc<S>, store: &Store, settings: &Settings) -> Result<RunSummary>
where
    S: SuggestionSource + ?Sized,
{
    settings.check()?;
    let start_time = Local::now();
    let mut snapshot = store.load().await?;
    let mut failed = Vec::new();

    if !snapshot.streets_complete {
        info_time!("=== COLLECTING STREET NAMES ===");
        let mut acc = Accumulator {
            values: std::mem::take(&mut snapshot.street_names),
            completed: std::mem::take(&mut snapshot.completed_prefixes),
        };
        let res = discover_streets(source.clone(), settings, &mut acc).await;
        snapshot.street_names = acc.values;
        snapshot.completed_prefixes = acc.completed;

        match res {
            Ok(stats) => {
                snapshot.streets_complete = true;
                info_time!(
                    start_time,
                    "=== STREET COLLECTION COMPLETE === {} streets, {} queries, {} pruned",
                    snapshot.street_names.len(),
                    stats.queried,
                    stats.pruned
                );
            }
            Err(Error::Incomplete { failed: f }) => {
                warn_time!("street collection left {} prefix(es) for the next run", f.len());
                failed.extend(f);
            }
            Err(err) => {
                store.save(&snapshot).await?;
                return Err(err);
            }
        }
        store.save(&snapshot).await?;
    }

    info_time!("=== COLLECTING HOUSE NUMBERS ===");
    let pending: Vec<String> = snapshot
        .street_names
        .iter()
        .filter(|street| !snapshot.house_numbers.contains_key(*street))
        .cloned()
        .collect();
    info_time!(
        "Processing {} of {} streets",
        pending.len(),
        snapshot.street_names.len()
    );

    let mut processed = 0;
    for (i, street) in pending.iter().enumerate() {
        info_time!("[{}/{}] Processing street: {street}", i + 1, pending.len());
        match discover_house_numbers(source.clone(), street, settings).await {
            Ok(numbers) => {
                snapshot.house_numbers.insert(street.clone(), numbers);
            }
            Err(Error::Incomplete { failed: f }) => {
                warn_time!("house numbers of '{street}' incomplete, retry on next run");
                failed.extend(f);
            }
            Err(err) => {
                store.save(&snapshot).await?;
                return Err(err);
            }
        }

        processed += 1;
        if processed % settings.checkpoint_every == 0 {
            store.save(&snapshot).await?;
            info_time!("Progress saved - processed {}/{} streets", i + 1, pending.len());
        }
    }

    store.save(&snapshot).await?;

    let summary = RunSummary {
        streets: snapshot.street_names.len(),
        completed_prefixes: snapshot.completed_prefixes.len(),
        streets_with_numbers: snapshot.house_numbers.len(),
        house_numbers: snapshot.total_house_numbers(),
        processed_streets: processed,
    };
    info_time!(
        start_time,
        "=== FINAL RESULTS === {} streets, {} with house numbers, {} house numbers",
        summary.streets,
        summary.streets_with_numbers,
        summary.house_numbers
    );

    if failed.is_empty() {
        Ok(summary)
    } else {
        Err(Error::Incomplete { failed })
    }
}
