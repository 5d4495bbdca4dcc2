//! Saturation-aware prefix expansion.
//!
//! The endpoints never return more than `threshold` suggestions. A prefix that comes
//! back with fewer is complete; one that comes back full may be truncated, so every
//! child prefix (one more alphabet character) gets queried as well.
//!
//! Pending prefixes live on an explicit stack. Up to `max_in_flight` queries run as
//! tasks in a `JoinSet`; their answers are merged into the caller's [`Accumulator`]
//! by the single loop that owns it.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::parse::Suggestion;
use crate::{warn_time, Error, Result, SATURATION_THRESHOLD};

/// A prefix lookup against one endpoint.
#[async_trait]
pub trait PrefixQuery: Send + Sync + 'static {
    async fn query(&self, prefix: &str) -> Result<Vec<Suggestion>>;
}

/// Returns `true` when `next` can never follow `prefix`, so the child isn't queried.
pub type SkipFn = fn(&str, char) -> bool;

#[derive(Clone)]
pub struct ExpandConfig {
    /// Prefixes the search starts from. May contain `""`.
    pub roots: Vec<String>,
    /// Characters appended to a saturated prefix.
    pub alphabet: Vec<char>,
    pub threshold: usize,
    pub max_in_flight: usize,
    pub skip: Option<SkipFn>,
    /// Record values returned by saturated queries too, not just by complete ones.
    pub keep_saturated: bool,
}

impl ExpandConfig {
    pub fn new<R, S>(roots: R, alphabet: &str) -> Self
    where
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            alphabet: alphabet.chars().collect(),
            threshold: SATURATION_THRESHOLD,
            max_in_flight: 1,
            skip: None,
            keep_saturated: true,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_skip(mut self, skip: Option<SkipFn>) -> Self {
        self.skip = skip;
        self
    }

    pub fn keep_saturated(mut self, keep: bool) -> Self {
        self.keep_saturated = keep;
        self
    }

    /// Child prefixes of a saturated `prefix`, and how many the skip rule removed.
    fn children(&self, prefix: &str) -> (Vec<String>, usize) {
        let mut pruned = 0;
        let children = self
            .alphabet
            .iter()
            .filter(|&&c| {
                let skip = self.skip.is_some_and(|skip| skip(prefix, c));
                pruned += usize::from(skip);
                !skip
            })
            .map(|&c| {
                let mut child = String::with_capacity(prefix.len() + c.len_utf8());
                child.push_str(prefix);
                child.push(c);
                child
            })
            .collect();
        (children, pruned)
    }
}

/// Everything an expansion has proven so far. Seed it from a checkpoint to resume.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Accumulator {
    pub values: BTreeSet<String>,
    /// Prefixes whose query returned fewer than `threshold` suggestions.
    pub completed: BTreeSet<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExpandStats {
    pub queried: usize,
    pub skipped_complete: usize,
    pub pruned: usize,
    pub saturated: usize,
    pub failed: usize,
}

/// Runs the expansion to exhaustion.
///
/// A prefix whose query fails is neither marked complete nor expanded; the rest of the
/// search continues and the failed prefixes are reported as [`Error::Incomplete`] at
/// the end. `acc` keeps everything that was proven either way.
pub async fn expand<Q>(
    query: Arc<Q>,
    config: &ExpandConfig,
    acc: &mut Accumulator,
) -> Result<ExpandStats>
where
    Q: PrefixQuery + ?Sized,
{
    let limit = config.max_in_flight.max(1);
    // An empty answer must always count as complete.
    let threshold = config.threshold.max(1);
    let mut stats = ExpandStats::default();
    let mut failed = Vec::new();
    let mut seen = HashSet::new();
    let mut pending: Vec<String> = config.roots.iter().rev().cloned().collect();
    let mut in_flight = JoinSet::new();

    loop {
        while in_flight.len() < limit {
            let Some(prefix) = pending.pop() else {
                break;
            };
            if !seen.insert(prefix.clone()) {
                continue;
            }
            if acc.completed.contains(&prefix) {
                stats.skipped_complete += 1;
                continue;
            }
            stats.queried += 1;
            in_flight.spawn({
                let query = Arc::clone(&query);
                async move {
                    let res = query.query(&prefix).await;
                    (prefix, res)
                }
            });
        }

        let Some(task) = in_flight.join_next().await else {
            break;
        };
        let (prefix, res) = task?;
        let suggestions = match res {
            Ok(suggestions) => suggestions,
            Err(err) => {
                warn_time!("prefix '{prefix}' left unfinished: {err}");
                stats.failed += 1;
                failed.push(prefix);
                continue;
            }
        };

        let saturated = suggestions.len() >= threshold;
        if !saturated || config.keep_saturated {
            acc.values.extend(
                suggestions
                    .iter()
                    .map(Suggestion::text)
                    .filter(|s| !s.is_empty())
                    .map(String::from),
            );
        }

        if saturated {
            stats.saturated += 1;
            let (children, pruned) = config.children(&prefix);
            stats.pruned += pruned;
            // Reversed so the stack pops them in alphabet order.
            pending.extend(children.into_iter().rev());
        } else {
            acc.completed.insert(prefix);
        }
    }

    if failed.is_empty() {
        Ok(stats)
    } else {
        failed.sort();
        Err(Error::Incomplete { failed })
    }
}
