//! Read back ISO 9660 images
//!
//! Walks the Joliet tree when present, otherwise the primary tree. Only
//! what seed images use is supported: single extent files, no Rock Ridge.

use std::io;

use super::iso9660::{JOLIET_ESCAPE, SECTOR_SIZE, STANDARD_ID};

const MAX_DEPTH: usize = 32;

/// Parsed image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoImage {
    /// Primary volume identifier
    pub volume_label: String,
    /// Joliet volume identifier, when the image carries Joliet names
    pub joliet_label: Option<String>,
    /// Files in directory order
    pub entries: Vec<IsoEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoEntry {
    pub path: String,
    pub content: Vec<u8>,
}

impl IsoImage {
    /// Paths of every file
    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.path.as_str()).collect()
    }

    pub fn get(&self, path: &str) -> Option<&IsoEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Label as the guest sees it
    ///
    /// Joliet when present, extended by the primary label's tail when the
    /// Joliet label is a truncated prefix of it, the way blkid reports it.
    pub fn label(&self) -> String {
        let Some(joliet) = &self.joliet_label else {
            return self.volume_label.clone();
        };
        let n = joliet.len();
        match (self.volume_label.get(..n), self.volume_label.get(n..)) {
            (Some(head), Some(tail)) if !tail.is_empty() && head.eq_ignore_ascii_case(joliet) => {
                format!("{}{}", joliet, tail)
            }
            _ => joliet.clone(),
        }
    }
}

fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

fn slice(image: &[u8], start: usize, len: usize) -> io::Result<&[u8]> {
    start
        .checked_add(len)
        .and_then(|end| image.get(start..end))
        .ok_or_else(|| invalid_data(format!("range {}+{} outside image", start, len)))
}

fn u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn decode_ucs2(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Location and size of a directory record's extent
#[derive(Debug, Clone, Copy)]
struct Extent {
    location: u32,
    size: u32,
}

/// Parse an image produced by [`Iso9660Writer`](super::Iso9660Writer)
pub fn read_image(image: &[u8]) -> io::Result<IsoImage> {
    let mut volume_label = None;
    let mut primary_root = None;
    let mut joliet = None;

    for sector in 16.. {
        let descriptor = slice(image, sector * SECTOR_SIZE, SECTOR_SIZE)?;
        if &descriptor[1..6] != STANDARD_ID {
            return Err(invalid_data(format!(
                "no volume descriptor at sector {}",
                sector
            )));
        }

        let root = Extent {
            location: u32_le(&descriptor[158..162]),
            size: u32_le(&descriptor[166..170]),
        };
        match descriptor[0] {
            1 => {
                volume_label = Some(String::from_utf8_lossy(&descriptor[40..72]).trim_end().to_string());
                primary_root = Some(root);
            }
            2 if &descriptor[88..91] == JOLIET_ESCAPE
                || &descriptor[88..91] == b"%/@"
                || &descriptor[88..91] == b"%/C" =>
            {
                let label = decode_ucs2(&descriptor[40..72]).trim_end().to_string();
                joliet = Some((label, root));
            }
            255 => break,
            _ => {}
        }
    }

    let volume_label =
        volume_label.ok_or_else(|| invalid_data("missing primary volume descriptor"))?;
    let (joliet_label, root, is_joliet) = match joliet {
        Some((label, root)) => (Some(label), root, true),
        None => (
            None,
            primary_root.ok_or_else(|| invalid_data("missing root directory"))?,
            false,
        ),
    };

    let mut entries = Vec::new();
    walk(image, root, is_joliet, "", 0, &mut entries)?;

    Ok(IsoImage {
        volume_label,
        joliet_label,
        entries,
    })
}

fn walk(
    image: &[u8],
    dir: Extent,
    joliet: bool,
    prefix: &str,
    depth: usize,
    entries: &mut Vec<IsoEntry>,
) -> io::Result<()> {
    if depth > MAX_DEPTH {
        return Err(invalid_data("directory nesting too deep"));
    }

    let extent = slice(image, dir.location as usize * SECTOR_SIZE, dir.size as usize)?;
    let mut offset = 0;
    while offset < extent.len() {
        let len = extent[offset] as usize;
        if len == 0 {
            // Rest of the sector is padding
            offset = (offset / SECTOR_SIZE + 1) * SECTOR_SIZE;
            continue;
        }

        let record = slice(extent, offset, len)?;
        offset += len;
        if record.len() < 34 {
            return Err(invalid_data("truncated directory record"));
        }

        let ident_len = record[32] as usize;
        let ident = slice(record, 33, ident_len)?;
        if ident == [0] || ident == [1] {
            continue;
        }

        let name = if joliet {
            decode_ucs2(ident)
        } else {
            String::from_utf8_lossy(ident).into_owned()
        };
        let name = match name.split_once(';') {
            Some((name, _version)) => name.to_string(),
            None => name,
        };
        let name = if joliet {
            name
        } else {
            name.trim_end_matches('.').to_string()
        };

        let path = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        let child = Extent {
            location: u32_le(&record[2..6]),
            size: u32_le(&record[10..14]),
        };

        if record[25] & 0x02 != 0 {
            walk(image, child, joliet, &path, depth + 1, entries)?;
        } else {
            let content = if child.size == 0 {
                Vec::new()
            } else {
                slice(image, child.location as usize * SECTOR_SIZE, child.size as usize)?.to_vec()
            };
            entries.push(IsoEntry { path, content });
        }
    }

    Ok(())
}
