//! Manifest (dry-run) image writer
//!
//! Records what an image would contain and emits it as JSON instead of an
//! ISO. Paths are validated with the same rules as the ISO writer.

use serde::{Deserialize, Serialize};
use std::io::{self, Write};

use super::iso9660::PathSet;
use super::{ImageHandle, ImageWriter};

/// Manifest of an assembled image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub volume_label: String,
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub size: usize,
}

impl Manifest {
    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.path.as_str()).collect()
    }
}

/// Writer producing a JSON [`Manifest`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestWriter;

/// Manifest being populated
#[derive(Debug, Default)]
pub struct ManifestHandle {
    entries: Vec<ManifestEntry>,
    paths: PathSet,
}

impl ImageWriter for ManifestWriter {
    type Handle = ManifestHandle;

    fn open(&self) -> io::Result<ManifestHandle> {
        Ok(ManifestHandle::default())
    }
}

impl ImageHandle for ManifestHandle {
    fn add_file(&mut self, content: &[u8], path: &str) -> io::Result<()> {
        self.paths.insert(path)?;
        self.entries.push(ManifestEntry {
            path: path.to_string(),
            size: content.len(),
        });
        Ok(())
    }

    fn finalize(&mut self, sink: &mut dyn Write, label: &str) -> io::Result<()> {
        let manifest = Manifest {
            volume_label: label.to_string(),
            entries: std::mem::take(&mut self.entries),
        };
        serde_json::to_writer_pretty(&mut *sink, &manifest)?;
        writeln!(sink)?;
        sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_json() {
        let mut handle = ManifestWriter.open().unwrap();
        handle.add_file(b"abc", "meta-data").unwrap();
        handle.add_file(b"", "user-data").unwrap();

        let mut out = Vec::new();
        handle.finalize(&mut out, "cidata").unwrap();
        let manifest: Manifest = serde_json::from_slice(&out).unwrap();

        assert_eq!(manifest.volume_label, "cidata");
        assert_eq!(manifest.paths(), vec!["meta-data", "user-data"]);
        assert_eq!(manifest.entries[0].size, 3);
    }

    #[test]
    fn test_manifest_rejects_bad_paths() {
        let mut handle = ManifestWriter.open().unwrap();
        handle.add_file(b"", "meta-data").unwrap();
        assert!(handle.add_file(b"", "meta-data").is_err());
        assert!(handle.add_file(b"", "ec2//x").is_err());
    }

    #[test]
    fn test_manifest_accepts_what_the_iso_writer_accepts() {
        let long_name = "n".repeat(65);
        let mut handle = ManifestWriter.open().unwrap();
        for path in ["a/../b", "./meta-data", "bad\u{7}name", "user:data", long_name.as_str()] {
            let err = handle.add_file(b"", path).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{path:?}");
        }

        handle.add_file(b"", "ec2/latest/user-data").unwrap();
        let err = handle.add_file(b"", "ec2/latest").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        let err = handle.add_file(b"", "ec2/latest/user-data/x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
