use crate::loader::{DatasetLoader, LoadOutcome};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

/// Identity of a loaded source: where it lives and when it was last written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
}

impl SourceKey {
    pub fn for_path(path: &Path) -> Self {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        Self {
            path: path.to_path_buf(),
            modified,
        }
    }
}

/// Session-scoped dataset cache.
///
/// Loads each source once and hands out clones of the same frame afterwards.
/// Entries are dropped by [`SessionCache::reload`] or replaced when the file's
/// modification time changes. Loads that fell back to the empty dataset are
/// not cached, so the next request tries again.
#[derive(Debug, Default)]
pub struct SessionCache {
    loader: DatasetLoader,
    entries: HashMap<SourceKey, LoadOutcome>,
    loads: usize,
}

impl SessionCache {
    pub fn new(loader: DatasetLoader) -> Self {
        Self {
            loader,
            entries: HashMap::new(),
            loads: 0,
        }
    }

    pub fn get_or_load(&mut self, path: &Path) -> LoadOutcome {
        let key = SourceKey::for_path(path);
        if let Some(hit) = self.entries.get(&key) {
            debug!("Session cache hit for {}", path.display());
            return hit.clone();
        }

        self.loads += 1;
        let outcome = self.loader.load(path);
        if outcome.available {
            info!("Caching dataset for {} ({} rows)", path.display(), outcome.dataset.height());
            // one entry per path: a newer modification time replaces the old one
            self.entries.retain(|cached, _| cached.path != key.path);
            self.entries.insert(key, outcome.clone());
        }
        outcome
    }

    /// Drops every cached entry for `path` and loads it again.
    pub fn reload(&mut self, path: &Path) -> LoadOutcome {
        self.entries.retain(|key, _| key.path != path);
        info!("Reloading {}", path.display());
        self.get_or_load(path)
    }

    /// Number of times the underlying loader actually ran.
    pub fn load_count(&self) -> usize {
        self.loads
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_fixture(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("sales_dashboard_cache_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(
            &path,
            "Order Date,Region,Sales,Quantity,Profit\n2023-01-01,West,10.0,1,2.0\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_second_request_is_served_from_cache() {
        let path = write_fixture("cached.csv");
        let mut cache = SessionCache::default();

        let first = cache.get_or_load(&path);
        let second = cache.get_or_load(&path);

        assert!(first.available);
        assert_eq!(first.dataset.height(), 1);
        assert_eq!(second.dataset.height(), 1);
        assert_eq!(cache.load_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reload_runs_loader_again() {
        let path = write_fixture("reloaded.csv");
        let mut cache = SessionCache::default();

        cache.get_or_load(&path);
        cache.reload(&path);

        assert_eq!(cache.load_count(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_modified_file_replaces_stale_entry() {
        use std::time::{Duration, UNIX_EPOCH};

        let path = write_fixture("modified.csv");
        let touch = |secs: u64| {
            fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(UNIX_EPOCH + Duration::from_secs(secs))
                .unwrap();
        };
        let mut cache = SessionCache::default();

        touch(1_700_000_000);
        cache.get_or_load(&path);
        touch(1_700_000_600);
        cache.get_or_load(&path);

        assert_eq!(cache.load_count(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unavailable_source_is_not_cached() {
        let mut cache = SessionCache::default();
        let path = Path::new("/nonexistent/sales.csv");

        let outcome = cache.get_or_load(path);
        cache.get_or_load(path);

        assert!(!outcome.available);
        assert!(cache.is_empty());
        assert_eq!(cache.load_count(), 2);
    }
}
