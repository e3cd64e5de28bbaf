//! Seed image assembly
//!
//! The assembler renders every document for the model's datasource and
//! hands them to an [`ImageWriter`]. Errors from the writer are wrapped with
//! the stage that failed. Nothing reaches the output sink before all files
//! were added, so a failed assembly never yields a partial image that
//! looks complete.

pub mod inspect;
pub mod iso9660;
pub mod manifest;

use std::io::{self, Write};
use tracing::{debug, info};

use crate::{CloudInitError, ImageStage, SeedConfig};

pub use inspect::{IsoEntry, IsoImage, read_image};
pub use iso9660::Iso9660Writer;
pub use manifest::{Manifest, ManifestWriter};

/// Filesystem image writer
///
/// `open` starts a new image and returns a handle. Dropping the handle
/// releases it.
pub trait ImageWriter {
    type Handle: ImageHandle;

    fn open(&self) -> io::Result<Self::Handle>;
}

/// An open image being populated
pub trait ImageHandle {
    /// Add a file at `path`, relative to the image root, using `/` separators
    fn add_file(&mut self, content: &[u8], path: &str) -> io::Result<()>;

    /// Write the complete image with the given volume label to `sink`
    fn finalize(&mut self, sink: &mut dyn Write, label: &str) -> io::Result<()>;
}

/// Assemble the ISO 9660 seed image for `config` into `sink`
pub fn assemble_image(config: &SeedConfig, sink: &mut dyn Write) -> Result<(), CloudInitError> {
    assemble_with(&Iso9660Writer::new(), config, sink)
}

/// Assemble the ISO 9660 seed image into memory
pub fn assemble_image_to_vec(config: &SeedConfig) -> Result<Vec<u8>, CloudInitError> {
    let mut image = Vec::new();
    assemble_image(config, &mut image)?;
    Ok(image)
}

/// Assemble a seed image for `config` with any writer
pub fn assemble_with<W: ImageWriter>(
    writer: &W,
    config: &SeedConfig,
    sink: &mut dyn Write,
) -> Result<(), CloudInitError> {
    let datasource = config.kind().datasource();
    let files = datasource.render_files(config)?;

    let mut handle = writer
        .open()
        .map_err(|e| CloudInitError::image(ImageStage::Open, e))?;

    for file in &files {
        debug!("Adding {} ({} bytes)", file.path, file.content.len());
        handle
            .add_file(file.content.as_bytes(), &file.path)
            .map_err(|e| CloudInitError::image(ImageStage::AddFile(file.path.clone()), e))?;
    }

    let label = datasource.volume_label();
    handle
        .finalize(sink, label)
        .map_err(|e| CloudInitError::image(ImageStage::Finalize, e))?;

    info!(
        "Assembled {} image '{}' with {} entries",
        datasource.name(),
        label,
        files.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    /// Writer failing at a chosen stage
    struct FailingWriter {
        fail_open: bool,
        fail_on_path: Option<&'static str>,
    }

    struct FailingHandle {
        fail_on_path: Option<&'static str>,
        added: usize,
    }

    impl ImageWriter for FailingWriter {
        type Handle = FailingHandle;

        fn open(&self) -> io::Result<FailingHandle> {
            if self.fail_open {
                return Err(io::Error::other("no scratch space"));
            }
            Ok(FailingHandle {
                fail_on_path: self.fail_on_path,
                added: 0,
            })
        }
    }

    impl ImageHandle for FailingHandle {
        fn add_file(&mut self, _content: &[u8], path: &str) -> io::Result<()> {
            if self.fail_on_path == Some(path) {
                return Err(io::Error::other("disk full"));
            }
            self.added += 1;
            Ok(())
        }

        fn finalize(&mut self, sink: &mut dyn Write, label: &str) -> io::Result<()> {
            writeln!(sink, "{} {}", label, self.added)
        }
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_open_failure_names_stage() {
        let config = SeedConfig::new_nocloud().unwrap();
        let writer = FailingWriter {
            fail_open: true,
            fail_on_path: None,
        };
        let mut sink = Vec::new();
        let err = assemble_with(&writer, &config, &mut sink).unwrap_err();
        assert!(matches!(
            err,
            CloudInitError::Image {
                stage: ImageStage::Open,
                ..
            }
        ));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_unrepresentable_timestamp_fails_open() {
        let config = SeedConfig::new_nocloud().unwrap();
        let writer = Iso9660Writer::with_timestamp(Utc.with_ymd_and_hms(2200, 6, 1, 0, 0, 0).unwrap());
        let mut sink = Vec::new();
        let err = assemble_with(&writer, &config, &mut sink).unwrap_err();
        assert!(matches!(
            err,
            CloudInitError::Image {
                stage: ImageStage::Open,
                ..
            }
        ));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_add_file_failure_aborts() {
        let config = SeedConfig::new_nocloud().unwrap();
        let writer = FailingWriter {
            fail_open: false,
            fail_on_path: Some("user-data"),
        };
        let mut sink = Vec::new();
        let err = assemble_with(&writer, &config, &mut sink).unwrap_err();
        match err {
            CloudInitError::Image {
                stage: ImageStage::AddFile(path),
                ..
            } => assert_eq!(path, "user-data"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(sink.is_empty());
    }

    #[test]
    fn test_finalize_failure_names_stage() {
        let config = SeedConfig::new_ec2().unwrap();
        let err = assemble_image(&config, &mut BrokenSink).unwrap_err();
        assert!(matches!(
            err,
            CloudInitError::Image {
                stage: ImageStage::Finalize,
                ..
            }
        ));
        assert!(err.to_string().starts_with("Image finalize failed"));
    }

    #[test]
    fn test_label_passed_to_writer() {
        let config = SeedConfig::new_config_drive().unwrap();
        let writer = FailingWriter {
            fail_open: false,
            fail_on_path: None,
        };
        let mut sink = Vec::new();
        assemble_with(&writer, &config, &mut sink).unwrap();
        assert_eq!(String::from_utf8(sink).unwrap(), "config-2 2\n");
    }
}
