//! Read-only access to the generated archive on disk.
//!
//! Every file is regenerated by external scripts and read fresh on each
//! request; nothing here caches or writes.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult};
use crate::models::{Event, EventsFile, PlateIndex, PlateLocation, RouteInstance};

/// Handle on the archive root (`GENERATED_PATH`).
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative archive path, refusing anything that escapes the root.
    fn resolve(&self, relative: &str) -> AppResult<PathBuf> {
        let rel = Path::new(relative);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(AppError::BadRequest(format!(
                "invalid archive path {relative}"
            )));
        }
        Ok(self.root.join(rel))
    }

    /// Read raw bytes, `None` when the file does not exist.
    pub async fn read_bytes(&self, relative: &str) -> AppResult<Option<Vec<u8>>> {
        let path = self.resolve(relative)?;
        match fs::read(&path).await {
            Ok(bytes) => {
                debug!(path = %path.display(), bytes = bytes.len(), "Read archive file");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read_json<T: DeserializeOwned>(&self, relative: &str) -> AppResult<Option<T>> {
        match self.read_bytes(relative).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Read a JSON file that must exist.
    pub async fn require_json<T: DeserializeOwned>(&self, relative: &str) -> AppResult<T> {
        self.read_json(relative)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{relative} is not available")))
    }

    /// Route instances for a `yyyy-mm` month.
    pub async fn month_routes(&self, month: &str) -> AppResult<Option<Vec<RouteInstance>>> {
        self.read_json(&format!("coords/{month}.json")).await
    }

    /// Every monthly coordinate file, sorted by name.
    pub async fn month_files(&self) -> AppResult<Vec<PathBuf>> {
        self.json_files_in("coords").await
    }

    /// All events across every file under `events/`.
    #[instrument(skip(self))]
    pub async fn all_events(&self) -> AppResult<Vec<Event>> {
        let mut events = Vec::new();
        for path in self.json_files_in("events").await? {
            let bytes = fs::read(&path).await?;
            let file: EventsFile = serde_json::from_slice(&bytes)?;
            events.extend(file.into_events()?);
        }
        debug!(count = events.len(), "Loaded events");
        Ok(events)
    }

    pub async fn plate_index(&self) -> AppResult<PlateIndex> {
        self.require_json("plates/plates.json").await
    }

    pub async fn plate_locations(&self) -> AppResult<Vec<PlateLocation>> {
        self.require_json("progressiveStats/plates.json").await
    }

    /// Sorted `*.json` files in an archive subdirectory; missing directory is empty.
    async fn json_files_in(&self, dir: &str) -> AppResult<Vec<PathBuf>> {
        let dir = self.resolve(dir)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Parse one monthly coordinate file.
pub async fn load_routes_file(path: &Path) -> AppResult<Vec<RouteInstance>> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::new(dir.path());
        assert!(store.month_routes("2020-01").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let store = ArchiveStore::new("/tmp");
        let err = store.read_bytes("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_all_events_merges_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "events/2023.json", r#"[{"id":"a"}]"#);
        write(dir.path(), "events/2024.json", r#"{"b":{"id":"b"},"c":{"id":"c"}}"#);
        write(dir.path(), "events/notes.txt", "ignored");
        let store = ArchiveStore::new(dir.path());
        let events = store.all_events().await.unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.id.to_string()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_month_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "coords/2023-02.json", "[]");
        write(dir.path(), "coords/2023-01.json", "[]");
        let store = ArchiveStore::new(dir.path());
        let files = store.month_files().await.unwrap();
        assert!(files[0].ends_with("2023-01.json"));
        assert_eq!(files.len(), 2);
    }

    #[tokio::test]
    async fn test_require_json_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::new(dir.path());
        let err = store.plate_index().await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
