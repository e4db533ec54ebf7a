use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Flat on-disk blob store keyed by filename.
///
/// Backs both the node's own files and the replicas it holds for peers. All
/// completed writes go through a rename, so readers only ever observe whole
/// files; in-flight data lives in hidden `.part` staging files that `list`
/// skips and `clear` sweeps away.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating store directory {:?}", self.dir))?;
        Ok(())
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Where an in-flight transfer stages its bytes before commit.
    pub fn staging_path(&self, filename: &str) -> PathBuf {
        self.dir.join(format!(".{}.part", filename))
    }

    /// Promotes a fully received staging file to its final name.
    pub fn commit(&self, staging: &Path, filename: &str) -> Result<PathBuf> {
        let dest = self.path_for(filename);
        fs::rename(staging, &dest)
            .with_context(|| format!("committing {:?} to {:?}", staging, dest))?;
        Ok(dest)
    }

    pub fn write(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        self.ensure_dir()?;
        let staging = self.staging_path(filename);
        fs::write(&staging, bytes).with_context(|| format!("staging {:?}", staging))?;
        self.commit(&staging, filename)
    }

    pub fn read(&self, filename: &str) -> Result<Vec<u8>> {
        let path = self.path_for(filename);
        fs::read(&path).with_context(|| format!("reading {:?}", path))
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.path_for(filename).is_file()
    }

    /// Completed files currently in the store, staging files excluded.
    pub fn list(&self) -> Vec<String> {
        let mut names = Vec::new();
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return names;
        };
        for entry in entries.flatten() {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if entry.path().is_file() {
                names.push(name);
            }
        }
        names.sort();
        names
    }

    pub fn remove(&self, filename: &str) -> Result<bool> {
        let path = self.path_for(filename);
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("removing {:?}", path))?;
        Ok(true)
    }

    /// Empties the store, staging leftovers included. The directory survives.
    pub fn clear(&self) -> Result<()> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Ok(());
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                fs::remove_file(&path).with_context(|| format!("removing {:?}", path))?;
            }
        }
        Ok(())
    }
}
