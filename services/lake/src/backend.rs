//! Storage backends behind a capability trait.

use std::path::{Path, PathBuf};

use crate::error::{LakeError, Result};

/// Minimal object-store surface the partition manager needs.
///
/// Paths are forward-slash relative keys under the backend root. Local
/// filesystems support `atomic_replace`; cloud blob stores implement it as
/// a direct final-object write, with idempotence carried by content-hashed
/// names instead.
pub trait StorageBackend: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    fn write_bytes(&self, path: &str, data: &[u8]) -> Result<()>;

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>>;

    /// Move `tmp_path` over `final_path`, atomically where supported.
    fn atomic_replace(&self, tmp_path: &str, final_path: &str) -> Result<()>;

    /// Recursive flat listing of file keys under a prefix.
    fn listdir(&self, prefix: &str) -> Vec<String>;

    /// Object size in bytes, when known.
    fn size(&self, path: &str) -> Option<u64>;
}

/// Local filesystem backend rooted at a directory.
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn to_local(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in key.split('/').filter(|p| !p.is_empty() && *p != ".") {
            path.push(part);
        }
        path
    }

    fn to_key(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.root).ok().map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
    }

    fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                Self::walk(&path, out);
            } else {
                out.push(path);
            }
        }
    }
}

impl StorageBackend for LocalFs {
    fn exists(&self, path: &str) -> bool {
        self.to_local(path).exists()
    }

    fn write_bytes(&self, path: &str, data: &[u8]) -> Result<()> {
        let local = self.to_local(path);
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LakeError::io(path, e))?;
        }
        std::fs::write(&local, data).map_err(|e| LakeError::io(path, e))
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        std::fs::read(self.to_local(path)).map_err(|e| LakeError::io(path, e))
    }

    fn atomic_replace(&self, tmp_path: &str, final_path: &str) -> Result<()> {
        let tmp = self.to_local(tmp_path);
        let dst = self.to_local(final_path);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LakeError::io(final_path, e))?;
        }
        std::fs::rename(&tmp, &dst).map_err(|e| LakeError::io(final_path, e))
    }

    fn listdir(&self, prefix: &str) -> Vec<String> {
        let dir = self.to_local(prefix);
        let mut paths = Vec::new();
        Self::walk(&dir, &mut paths);
        let mut keys: Vec<String> = paths.iter().filter_map(|p| self.to_key(p)).collect();
        keys.sort();
        keys
    }

    fn size(&self, path: &str) -> Option<u64> {
        std::fs::metadata(self.to_local(path)).ok().map(|m| m.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_replace_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());

        fs.write_bytes(".tmp/abc", b"hello").unwrap();
        fs.atomic_replace(".tmp/abc", "ds/symbol=X/part-1.jsonl").unwrap();
        assert!(fs.exists("ds/symbol=X/part-1.jsonl"));
        assert!(!fs.exists(".tmp/abc"));
        assert_eq!(fs.read_bytes("ds/symbol=X/part-1.jsonl").unwrap(), b"hello");
        assert_eq!(fs.size("ds/symbol=X/part-1.jsonl"), Some(5));
    }

    #[test]
    fn listdir_is_recursive_and_relative() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        fs.write_bytes("ds/a/x.jsonl", b"1").unwrap();
        fs.write_bytes("ds/a/b/y.jsonl", b"2").unwrap();
        let keys = fs.listdir("ds");
        assert_eq!(keys, vec!["ds/a/b/y.jsonl", "ds/a/x.jsonl"]);
    }
}
