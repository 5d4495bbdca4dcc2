//! On-disk checkpoint of a crawl.
//!
//! Three JSON documents hold the results (street names, completed street prefixes,
//! house numbers per street) and a small manifest records the schema version and
//! whether street discovery ran to the end. Reloading them is how a run resumes.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::{fs, io::AsyncWriteExt};

use crate::parse::sort_house_numbers;
use crate::{info_time, warn_time, Error, Result};

pub const STREET_NAMES_FILE: &str = "street_names.json";
pub const COMPLETED_FILE: &str = "completed_queries.json";
pub const HOUSE_NUMBERS_FILE: &str = "street_numbers.json";
pub const MANIFEST_FILE: &str = "checkpoint.json";
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    streets_complete: bool,
    saved_at: DateTime<Local>,
}

/// Everything a crawl has collected.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub street_names: BTreeSet<String>,
    pub completed_prefixes: BTreeSet<String>,
    pub house_numbers: BTreeMap<String, Vec<String>>,
    /// Street discovery finished without failed subtrees.
    pub streets_complete: bool,
}

impl Snapshot {
    pub fn total_house_numbers(&self) -> usize {
        self.house_numbers.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Reads the checkpoint. Missing files give empty data; unreadable ones are errors.
    pub async fn load(&self) -> Result<Snapshot> {
        let manifest: Option<Manifest> = self.read_json(MANIFEST_FILE).await?;
        if let Some(manifest) = &manifest {
            if manifest.version > SCHEMA_VERSION {
                return Err(Error::UnsupportedSchema {
                    found: manifest.version,
                    supported: SCHEMA_VERSION,
                });
            }
        }

        let street_names: BTreeSet<String> = self
            .read_json::<Vec<String>>(STREET_NAMES_FILE)
            .await?
            .unwrap_or_default()
            .into_iter()
            .collect();
        info_time!("Loaded {} existing street names", street_names.len());

        let completed_prefixes: BTreeSet<String> = self
            .read_json::<Vec<String>>(COMPLETED_FILE)
            .await?
            .unwrap_or_default()
            .into_iter()
            .collect();
        info_time!(
            "Loaded {} existing completed queries",
            completed_prefixes.len()
        );

        let house_numbers: BTreeMap<String, Vec<String>> = self
            .read_json(HOUSE_NUMBERS_FILE)
            .await?
            .unwrap_or_default();
        info_time!("Loaded house numbers for {} streets", house_numbers.len());

        let mut snapshot = Snapshot {
            street_names,
            completed_prefixes,
            house_numbers: house_numbers
                .into_iter()
                .map(|(street, numbers)| (street, sort_house_numbers(numbers)))
                .collect(),
            streets_complete: manifest.is_some_and(|m| m.streets_complete),
        };

        let orphans: Vec<String> = snapshot
            .house_numbers
            .keys()
            .filter(|street| !snapshot.street_names.contains(*street))
            .cloned()
            .collect();
        if !orphans.is_empty() {
            warn_time!(
                "{} street(s) had house numbers but no street name entry, adding them",
                orphans.len()
            );
            snapshot.street_names.extend(orphans);
        }

        Ok(snapshot)
    }

    /// Writes every file through a temp file and a rename, the manifest last.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let streets: Vec<&String> = snapshot.street_names.iter().collect();
        self.write_json(STREET_NAMES_FILE, &streets).await?;

        let prefixes: Vec<&String> = snapshot.completed_prefixes.iter().collect();
        self.write_json(COMPLETED_FILE, &prefixes).await?;

        let numbers: BTreeMap<&String, Vec<String>> = snapshot
            .house_numbers
            .iter()
            .map(|(street, numbers)| (street, sort_house_numbers(numbers.iter().cloned())))
            .collect();
        self.write_json(HOUSE_NUMBERS_FILE, &numbers).await?;

        let manifest = Manifest {
            version: SCHEMA_VERSION,
            streets_complete: snapshot.streets_complete,
            saved_at: Local::now(),
        };
        self.write_json(MANIFEST_FILE, &manifest).await?;

        info_time!(
            "Saved {} street names, {} completed prefixes, numbers for {} streets ({} total)",
            snapshot.street_names.len(),
            snapshot.completed_prefixes.len(),
            snapshot.house_numbers.len(),
            snapshot.total_house_numbers()
        );
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match fs::read(self.dir.join(name)).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let path_fin = self.dir.join(name);
        let path_tmp = self.dir.join(format!("{name}.tmp"));

        let mut data = serde_json::to_vec_pretty(value)?;
        data.push(b'\n');

        let mut f = fs::File::create(&path_tmp).await?;
        f.write_all(&data).await?;
        f.flush().await?;
        f.sync_data().await?;
        // Close before the rename, Windows refuses to replace an open file.
        drop(f);

        fs::rename(&path_tmp, &path_fin).await?;
        Ok(())
    }
}
