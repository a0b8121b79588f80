use crate::error::LoadError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Last edited text per dialect, one file per storage key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.txt"))
    }

    /// Persists `content`, or `default` when `content` is empty.
    pub fn save(&self, key: &str, content: &str, default: &str) -> Result<(), LoadError> {
        let path = self.path_for(key);
        let to_save = if content.is_empty() { default } else { content };
        fs::create_dir_all(&self.dir).map_err(|source| LoadError::Store {
            path: self.dir.clone(),
            source,
        })?;
        fs::write(&path, to_save).map_err(|source| LoadError::Store { path, source })
    }

    /// `None` when nothing (or only an empty text) was persisted.
    pub fn load(&self, key: &str) -> Result<Option<String>, LoadError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(text) if text.is_empty() => Ok(None),
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(LoadError::Store { path, source }),
        }
    }

    /// Returns whether anything was removed.
    pub fn remove(&self, key: &str) -> Result<bool, LoadError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(LoadError::Store { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state"));

        assert_eq!(store.load("realtimehtml_code").unwrap(), None);
        store.save("realtimehtml_code", "<p>x</p>", "<p>default</p>").unwrap();
        assert_eq!(store.load("realtimehtml_code").unwrap().as_deref(), Some("<p>x</p>"));

        assert!(store.remove("realtimehtml_code").unwrap());
        assert!(!store.remove("realtimehtml_code").unwrap());
        assert_eq!(store.load("realtimehtml_code").unwrap(), None);
    }

    #[test]
    fn test_empty_content_saves_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.save("svelte_editor_code", "", "<main/>").unwrap();
        assert_eq!(store.load("svelte_editor_code").unwrap().as_deref(), Some("<main/>"));
    }

    #[test]
    fn test_keys_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state"));
        store.save("../outside", "x", "").unwrap();
        assert!(dir.path().join("state").join(".._outside.txt").is_file());
        assert!(!dir.path().join("outside.txt").exists());
    }
}
