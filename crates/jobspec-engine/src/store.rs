//! Versioned job-spec storage with file persistence.
//!
//! Each saved spec keeps every version it was saved as. With persistence
//! enabled, version `n` of spec `id` lives at `<dir>/<id>/v<n>.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::job::Job;
use crate::snapshot::WorkspaceSnapshot;
use crate::types::is_valid_identifier;

/// One saved version of a spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecVersion {
    pub spec_id: String,
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub snapshot: WorkspaceSnapshot,
}

/// Metadata for a stored spec (for listing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecMetadata {
    pub id: String,
    pub name: Option<String>,
    pub latest_version: u32,
    pub version_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// In-memory spec store with optional file persistence.
///
/// # Example
///
/// ```ignore
/// let mut store = SpecStore::with_persistence(".jobspec/specs");
/// let count = store.load_from_disk()?;
/// let version = store.save("price-feed", &job)?;
/// let job = store.latest("price-feed").unwrap().snapshot.restore()?;
/// ```
#[derive(Debug, Default)]
pub struct SpecStore {
    /// Versions per spec, ascending by version number
    specs: HashMap<String, Vec<SpecVersion>>,
    persist_path: Option<PathBuf>,
}

impl SpecStore {
    /// Create a new in-memory store without persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that persists under the given directory.
    ///
    /// The directory will be created if it doesn't exist when saving.
    pub fn with_persistence(path: impl AsRef<Path>) -> Self {
        Self {
            specs: HashMap::new(),
            persist_path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Load every stored version from the persistence directory.
    ///
    /// Unreadable files are skipped with a warning. Returns the number of
    /// versions loaded.
    pub fn load_from_disk(&mut self) -> Result<usize> {
        let Some(ref path) = self.persist_path else {
            return Ok(0);
        };

        if !path.exists() {
            return Ok(0);
        }

        let mut count = 0;
        for spec_dir in std::fs::read_dir(path)? {
            let spec_dir = spec_dir?.path();
            if !spec_dir.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(&spec_dir)? {
                let file_path = entry?.path();
                if file_path.extension().map_or(true, |e| e != "json") {
                    continue;
                }
                let content = std::fs::read_to_string(&file_path)?;
                match serde_json::from_str::<SpecVersion>(&content) {
                    Ok(version) => {
                        log::debug!(
                            "Loaded spec '{}' v{} from {:?}",
                            version.spec_id,
                            version.version,
                            file_path
                        );
                        self.specs.entry(version.spec_id.clone()).or_default().push(version);
                        count += 1;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse spec version from {:?}: {}", file_path, e);
                    }
                }
            }
        }
        for versions in self.specs.values_mut() {
            versions.sort_by_key(|v| v.version);
            versions.dedup_by_key(|v| v.version);
        }
        log::info!("Loaded {} spec version(s) from {:?}", count, path);
        Ok(count)
    }

    /// Save the job as the next version of `spec_id`, returning the version number
    pub fn save(&mut self, spec_id: &str, job: &Job) -> Result<u32> {
        if !is_valid_identifier(&spec_id.replace('-', "_")) {
            return Err(EngineError::InvalidIdentifier(spec_id.to_string()));
        }
        let version = self.latest(spec_id).map_or(1, |v| v.version + 1);
        let entry = SpecVersion {
            spec_id: spec_id.to_string(),
            version,
            saved_at: Utc::now(),
            snapshot: WorkspaceSnapshot::capture(job),
        };
        self.save_to_disk(&entry)?;
        self.specs.entry(spec_id.to_string()).or_default().push(entry);
        Ok(version)
    }

    pub fn latest(&self, spec_id: &str) -> Option<&SpecVersion> {
        self.specs.get(spec_id).and_then(|v| v.last())
    }

    pub fn get(&self, spec_id: &str, version: u32) -> Option<&SpecVersion> {
        self.specs
            .get(spec_id)
            .and_then(|versions| versions.iter().find(|v| v.version == version))
    }

    /// Version numbers of a spec, ascending
    pub fn versions(&self, spec_id: &str) -> Vec<u32> {
        self.specs
            .get(spec_id)
            .map(|versions| versions.iter().map(|v| v.version).collect())
            .unwrap_or_default()
    }

    /// List all stored specs, sorted by id.
    pub fn list(&self) -> Vec<SpecMetadata> {
        let mut list: Vec<SpecMetadata> = self
            .specs
            .iter()
            .filter_map(|(id, versions)| {
                let latest = versions.last()?;
                Some(SpecMetadata {
                    id: id.clone(),
                    name: latest.snapshot.config.name.clone(),
                    latest_version: latest.version,
                    version_count: versions.len(),
                    updated_at: latest.saved_at,
                })
            })
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub fn contains(&self, spec_id: &str) -> bool {
        self.specs.contains_key(spec_id)
    }

    /// Remove a spec and all its versions.
    ///
    /// Returns the removed versions if the id was stored.
    pub fn remove(&mut self, spec_id: &str) -> Result<Option<Vec<SpecVersion>>> {
        self.delete_from_disk(spec_id)?;
        Ok(self.specs.remove(spec_id))
    }

    fn save_to_disk(&self, entry: &SpecVersion) -> Result<()> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };

        let dir = path.join(&entry.spec_id);
        std::fs::create_dir_all(&dir)?;
        let file_path = dir.join(format!("v{}.json", entry.version));
        let content = serde_json::to_string_pretty(entry)?;
        std::fs::write(&file_path, content)?;
        log::debug!("Saved spec '{}' v{} to {:?}", entry.spec_id, entry.version, file_path);
        Ok(())
    }

    fn delete_from_disk(&self, spec_id: &str) -> Result<()> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };

        let dir = path.join(spec_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            log::debug!("Deleted spec '{}' from {:?}", spec_id, dir);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PipelineBuilder;
    use crate::job::JobType;
    use crate::types::TaskKind;
    use tempfile::TempDir;

    fn test_job(name: &str) -> Job {
        let mut job = Job::new(JobType::Cron);
        job.config.name = Some(name.to_string());
        job.graph = PipelineBuilder::new()
            .add_task("fetch", TaskKind::Http)
            .with_field("url", "https://x/y")
            .build();
        job
    }

    #[test]
    fn test_in_memory_versions() {
        let mut store = SpecStore::new();

        assert_eq!(store.save("price-feed", &test_job("first")).unwrap(), 1);
        assert_eq!(store.save("price-feed", &test_job("second")).unwrap(), 2);
        assert_eq!(store.versions("price-feed"), vec![1, 2]);

        let latest = store.latest("price-feed").unwrap();
        assert_eq!(latest.snapshot.config.name.as_deref(), Some("second"));
        let first = store.get("price-feed", 1).unwrap().snapshot.restore().unwrap();
        assert_eq!(first.config.name.as_deref(), Some("first"));

        let list = store.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].latest_version, 2);
        assert_eq!(list[0].version_count, 2);

        let removed = store.remove("price-feed").unwrap();
        assert_eq!(removed.map(|v| v.len()), Some(2));
        assert!(!store.contains("price-feed"));
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let mut store = SpecStore::new();
        assert!(matches!(
            store.save("../escape", &test_job("x")),
            Err(EngineError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_persistent_store() {
        let temp_dir = TempDir::new().unwrap();
        let persist_path = temp_dir.path().join("specs");

        {
            let mut store = SpecStore::with_persistence(&persist_path);
            store.save("feed", &test_job("a")).unwrap();
            store.save("feed", &test_job("b")).unwrap();
        }
        assert!(persist_path.join("feed").join("v2.json").exists());

        {
            let mut store = SpecStore::with_persistence(&persist_path);
            assert_eq!(store.load_from_disk().unwrap(), 2);
            assert_eq!(store.versions("feed"), vec![1, 2]);
            assert_eq!(store.save("feed", &test_job("c")).unwrap(), 3);

            store.remove("feed").unwrap();
            assert!(!persist_path.join("feed").exists());
        }
    }

    #[test]
    fn test_skips_unreadable_files() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("feed");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("v1.json"), "not json").unwrap();

        let mut store = SpecStore::with_persistence(temp_dir.path());
        assert_eq!(store.load_from_disk().unwrap(), 0);
        assert!(!store.contains("feed"));
    }
}
