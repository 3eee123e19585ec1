use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::models::{Event, Registration};

/// Consider cached responses stale after 30 seconds.
/// Matches the query layer's freshness window for session-scoped data.
const CACHE_STALE_SECONDS: i64 = 30;

const CACHE_EXTENSION: &str = "json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_seconds(&self) -> i64 {
        (Utc::now() - self.cached_at).num_seconds()
    }

    pub fn age_display(&self) -> String {
        let seconds = self.age_seconds();
        if seconds < 60 {
            // Includes negative ages from clock skew
            "just now".to_string()
        } else if seconds < 3600 {
            format!("{}m ago", seconds / 60)
        } else if seconds < 86_400 {
            format!("{}h ago", seconds / 3600)
        } else {
            format!("{}d ago", seconds / 86_400)
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_seconds() > CACHE_STALE_SECONDS
    }
}

/// On-disk cache of responses fetched under the current session.
///
/// Everything here belongs to whichever identity was signed in when it was
/// fetched, so the whole cache is dropped on every session change.
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory: {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", name, CACHE_EXTENSION))
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let path = self.cache_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;

        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", name))?;

        Ok(Some(cached))
    }

    fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let cached = CachedData::new(data);
        let path = self.cache_path(name);
        let contents = serde_json::to_string_pretty(&cached)?;
        std::fs::write(&path, contents)?;
        Ok(())
    }

    /// Drop one cached entry. A missing entry is not an error.
    fn invalidate(&self, name: &str) -> Result<()> {
        let path = self.cache_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(name, "Cache entry invalidated");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove cache file: {}", path.display())),
        }
    }

    /// Remove every cached entry
    pub fn clear(&self) -> Result<()> {
        let entries = match std::fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(CACHE_EXTENSION) {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove cache file: {}", path.display()))?;
                removed += 1;
            }
        }
        debug!(removed, "Cache cleared");
        Ok(())
    }

    // ===== Events =====

    pub fn load_events(&self) -> Result<Option<CachedData<Vec<Event>>>> {
        self.load("events")
    }

    pub fn save_events(&self, events: &[Event]) -> Result<()> {
        self.save("events", &events)
    }

    /// Call after any change to an event or its remaining tickets
    pub fn invalidate_events(&self) -> Result<()> {
        self.invalidate("events")
    }

    // ===== Registrations =====

    pub fn load_registrations(&self) -> Result<Option<CachedData<Vec<Registration>>>> {
        self.load("registrations")
    }

    pub fn save_registrations(&self, registrations: &[Registration]) -> Result<()> {
        self.save("registrations", &registrations)
    }

    /// Call after booking, cancelling, RSVPing or transferring a ticket
    pub fn invalidate_registrations(&self) -> Result<()> {
        self.invalidate("registrations")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_cached_data_age_display_just_now() {
        let cached = CachedData::new(vec![1, 2, 3]);
        assert_eq!(cached.age_display(), "just now");
    }

    #[test]
    fn test_cached_data_age_display_units() {
        let mut cached = CachedData::new(());
        cached.cached_at = Utc::now() - Duration::minutes(5);
        assert_eq!(cached.age_display(), "5m ago");
        cached.cached_at = Utc::now() - Duration::hours(3);
        assert_eq!(cached.age_display(), "3h ago");
        cached.cached_at = Utc::now() - Duration::days(2);
        assert_eq!(cached.age_display(), "2d ago");
    }

    #[test]
    fn test_cached_data_is_stale() {
        let fresh = CachedData::new(vec![1]);
        assert!(!fresh.is_stale());

        let mut old = CachedData::new(vec![1]);
        old.cached_at = Utc::now() - Duration::seconds(31);
        assert!(old.is_stale());
    }

    #[test]
    fn test_save_load_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();

        assert!(cache.load_events().unwrap().is_none());
        cache.save_events(&[]).unwrap();
        cache.save_registrations(&[]).unwrap();
        assert!(cache.load_events().unwrap().is_some());

        cache.clear().unwrap();
        assert!(cache.load_events().unwrap().is_none());
        assert!(cache.load_registrations().unwrap().is_none());
    }

    #[test]
    fn test_invalidate_registrations_keeps_events() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        cache.save_events(&[]).unwrap();
        cache.save_registrations(&[]).unwrap();

        cache.invalidate_registrations().unwrap();

        assert!(cache.load_registrations().unwrap().is_none());
        assert!(cache.load_events().unwrap().is_some());
        // Nothing cached is fine
        cache.invalidate_registrations().unwrap();
    }

    #[test]
    fn test_invalidate_events_keeps_registrations() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        cache.save_events(&[]).unwrap();
        cache.save_registrations(&[]).unwrap();

        cache.invalidate_events().unwrap();

        assert!(cache.load_events().unwrap().is_none());
        assert!(cache.load_registrations().unwrap().is_some());
        cache.invalidate_events().unwrap();
    }

    #[test]
    fn test_clear_leaves_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        cache.clear().unwrap();
        assert!(dir.path().join("notes.txt").exists());
    }
}
