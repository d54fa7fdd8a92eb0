use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info};

use crate::tiles::TileCoord;

/// Default cache limit in bytes (50MB)
pub const DEFAULT_MAX_BYTES: u64 = 50 * 1024 * 1024;

/// Overrides the platform cache location when set
pub const CACHE_DIR_ENV: &str = "MAKEPAD_TRACK_MAP_CACHE_DIR";

const APP_DIR: &str = "makepad-track-map";

/// Platform cache directory for this crate
pub fn platform_cache_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(CACHE_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }

    #[cfg(target_os = "android")]
    {
        // the app has to export its cache directory as CACHE_DIR
        std::env::var("CACHE_DIR").ok().map(|p| PathBuf::from(p).join(APP_DIR))
    }

    #[cfg(any(target_os = "ios", target_os = "macos"))]
    {
        std::env::var("HOME").ok().map(|h| PathBuf::from(h).join("Library/Caches").join(APP_DIR))
    }

    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CACHE_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".cache")))
            .map(|p| p.join(APP_DIR))
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("LOCALAPPDATA").ok().map(|p| PathBuf::from(p).join(APP_DIR).join("cache"))
    }

    #[cfg(not(any(
        target_os = "android",
        target_os = "ios",
        target_os = "macos",
        target_os = "linux",
        target_os = "windows"
    )))]
    {
        None
    }
}

/// PNG tiles on disk, laid out as `{root}/tiles/{z}/{x}/{y}.png`
#[derive(Clone, Debug)]
pub struct DiskCache {
    root: PathBuf,
    max_bytes: u64,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self { root: root.into(), max_bytes }
    }

    pub fn platform_default() -> Option<Self> {
        platform_cache_dir().map(|root| Self::new(root, DEFAULT_MAX_BYTES))
    }

    fn tiles_dir(&self) -> PathBuf {
        self.root.join("tiles")
    }

    pub fn tile_path(&self, coord: &TileCoord) -> PathBuf {
        self.tiles_dir()
            .join(coord.z.to_string())
            .join(coord.x.to_string())
            .join(format!("{}.png", coord.y))
    }

    pub fn save(&self, coord: &TileCoord, data: &[u8]) -> io::Result<()> {
        let path = self.tile_path(coord);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)
    }

    pub fn load(&self, coord: &TileCoord) -> Option<Vec<u8>> {
        fs::read(self.tile_path(coord)).ok()
    }

    /// Bytes used by cached tiles
    pub fn size(&self) -> u64 {
        dir_size(&self.tiles_dir())
    }

    /// Delete least recently written tiles until the cache fits its limit
    pub fn evict_if_needed(&self) {
        let mut size = self.size();
        if size <= self.max_bytes {
            return;
        }
        let before = size;

        let mut files = Vec::new();
        collect_files(&self.tiles_dir(), &mut files);
        files.sort_by_key(|(_, modified, _)| *modified);

        for (path, _, len) in files {
            if size <= self.max_bytes {
                break;
            }
            if fs::remove_file(&path).is_ok() {
                size = size.saturating_sub(len);
            }
        }
        prune_empty_dirs(&self.tiles_dir());
        info!(before, after = size, "evicted tiles from disk cache");
    }

    pub fn clear(&self) {
        let dir = self.tiles_dir();
        if dir.exists() {
            if let Err(e) = fs::remove_dir_all(&dir) {
                debug!(error = %e, "could not clear tile cache");
            }
        }
    }
}

fn dir_size(path: &Path) -> u64 {
    fs::read_dir(path).into_iter().flatten().flatten().fold(0, |acc, entry| {
        let p = entry.path();
        acc + if p.is_dir() { dir_size(&p) } else { entry.metadata().map(|m| m.len()).unwrap_or(0) }
    })
}

fn collect_files(dir: &Path, files: &mut Vec<(PathBuf, SystemTime, u64)>) {
    for entry in fs::read_dir(dir).into_iter().flatten().flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files);
        } else if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                files.push((path, modified, metadata.len()));
            }
        }
    }
}

fn prune_empty_dirs(dir: &Path) {
    for entry in fs::read_dir(dir).into_iter().flatten().flatten() {
        let path = entry.path();
        if path.is_dir() {
            prune_empty_dirs(&path);
            // fails while the directory still has files
            let _ = fs::remove_dir(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), DEFAULT_MAX_BYTES);
        let coord = TileCoord { x: 3, y: 7, z: 5 };
        assert!(cache.load(&coord).is_none());
        cache.save(&coord, b"png bytes").unwrap();
        assert_eq!(cache.load(&coord).unwrap(), b"png bytes");
        assert!(dir.path().join("tiles/5/3/7.png").exists());
        assert_eq!(cache.size(), 9);
    }

    #[test]
    fn eviction_removes_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), 250);
        let old = TileCoord { x: 0, y: 0, z: 1 };
        let new = TileCoord { x: 1, y: 0, z: 1 };
        cache.save(&old, &[0u8; 200]).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        cache.save(&new, &[0u8; 200]).unwrap();

        cache.evict_if_needed();

        assert!(cache.load(&old).is_none());
        assert!(cache.load(&new).is_some());
        assert!(!dir.path().join("tiles/1/0").exists());
    }

    #[test]
    fn clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), DEFAULT_MAX_BYTES);
        cache.save(&TileCoord { x: 0, y: 0, z: 0 }, b"x").unwrap();
        cache.clear();
        assert_eq!(cache.size(), 0);
    }
}
