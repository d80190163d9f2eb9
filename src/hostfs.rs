//! Host filesystem access as a swappable collaborator, used for ATR images,
//! state files, and host↔disk import/export. Production code talks to the
//! real filesystem through [`StdHostFs`]; tests can substitute an in-memory
//! implementation without touching disk.

use std::io;
use std::path::{Path, PathBuf};

/// Opens/reads/writes files on the host filesystem.
pub trait HostFs: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;

    /// Atomic replace: write to a temp file in `path`'s directory, fsync,
    /// then rename over `path`. Used by the state file writer (§4.6) and by
    /// ATR image saves.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp_path = PathBuf::from(dir);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tmp_path.push(format!(".{file_name}.tmp"));
        {
            let mut f = std::fs::File::create(&tmp_path)?;
            use std::io::Write;
            f.write_all(data)?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

/// The real host filesystem, backed directly by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdHostFs;

impl HostFs for StdHostFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        std::fs::write(path, data)
    }
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Expands a leading `~/` against `$HOME`, as required for DOS command
/// path arguments (§4.6).
pub fn expand_home(input: &str) -> String {
    if let Some(rest) = input.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{home}/{rest}");
        }
    }
    input.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_home_only_applies_to_leading_tilde_slash() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(expand_home("~/disks/boot.atr"), "/home/tester/disks/boot.atr");
        assert_eq!(expand_home("/tmp/boot.atr"), "/tmp/boot.atr");
        assert_eq!(expand_home("a~/b"), "a~/b");
    }

    #[test]
    fn std_hostfs_write_atomic_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.bin");
        let fs = StdHostFs;
        fs.write_atomic(&path, b"hello").unwrap();
        assert_eq!(fs.read(&path).unwrap(), b"hello");
        fs.write_atomic(&path, b"world!").unwrap();
        assert_eq!(fs.read(&path).unwrap(), b"world!");
    }
}
