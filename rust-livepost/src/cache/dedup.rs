//! Permanent denylist of video ids that must not be re-ingested.
//!
//! Feeds have no memory of deletions, so a record removed as a duplicate
//! would come back on the next poll without this list. Entries stay until
//! explicitly removed.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::Result;
use crate::domain::Source;
use crate::utils::fs::{read_json_or_default, write_json_atomic};

type DenyMap = BTreeMap<Source, BTreeSet<String>>;

/// JSON-file backed `source -> [video_id]` denylist.
pub struct DedupDenylist {
    path: PathBuf,
    entries: RwLock<DenyMap>,
}

impl DedupDenylist {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries: DenyMap = read_json_or_default(&path);
        debug!(
            path = %path.display(),
            ids = entries.values().map(BTreeSet::len).sum::<usize>(),
            "Loaded dedup denylist"
        );
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_denied(&self, video_id: &str, source: Source) -> bool {
        self.entries
            .read()
            .get(&source)
            .is_some_and(|ids| ids.contains(video_id))
    }

    /// Add an id. Returns `false` if it was already denied.
    ///
    /// The id only becomes visible once it has been written to disk, so a
    /// failed add can be retried.
    pub fn add(&self, video_id: &str, source: Source) -> Result<bool> {
        let mut entries = self.entries.write();
        if entries.get(&source).is_some_and(|ids| ids.contains(video_id)) {
            return Ok(false);
        }

        let mut next = entries.clone();
        next.entry(source).or_default().insert(video_id.to_string());
        write_json_atomic(&self.path, &next)?;
        *entries = next;
        info!(video_id, source = %source, "Added to dedup denylist");
        Ok(true)
    }

    /// Remove an id. Returns `false` if it was not denied.
    pub fn remove(&self, video_id: &str, source: Source) -> Result<bool> {
        let mut entries = self.entries.write();
        if !entries.get(&source).is_some_and(|ids| ids.contains(video_id)) {
            return Ok(false);
        }

        let mut next = entries.clone();
        if let Some(ids) = next.get_mut(&source) {
            ids.remove(video_id);
            if ids.is_empty() {
                next.remove(&source);
            }
        }
        write_json_atomic(&self.path, &next)?;
        *entries = next;
        Ok(true)
    }

    pub fn ids(&self, source: Source) -> Vec<String> {
        self.entries
            .read()
            .get(&source)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}
