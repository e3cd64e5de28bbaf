//! ISO 9660 image writer with Joliet extensions
//!
//! Produces a single-session data image: the primary volume descriptor with
//! 8.3-style uppercase names, a Joliet supplementary descriptor carrying the
//! original file names in UCS-2, and one set of file extents shared by both
//! directory trees. The whole image is built in memory and written to the
//! sink in one piece by `finalize`.
//!
//! Layout (2048-byte sectors):
//!
//! ```text
//! 0..16   system area (zeroed)
//! 16      primary volume descriptor
//! 17      Joliet supplementary volume descriptor
//! 18      volume descriptor set terminator
//! 19..    path tables (L then M, primary then Joliet)
//!         directory extents (primary tree, then Joliet tree)
//!         file extents
//! ```

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use std::collections::BTreeSet;
use std::io::{self, Write};
use tracing::{debug, trace};

use super::{ImageHandle, ImageWriter};

pub const SECTOR_SIZE: usize = 2048;

/// Environment variable pinning image timestamps
pub const SOURCE_DATE_EPOCH: &str = "SOURCE_DATE_EPOCH";

/// UCS-2 level 3
pub(crate) const JOLIET_ESCAPE: &[u8; 3] = b"%/E";

pub(crate) const STANDARD_ID: &[u8; 5] = b"CD001";

const FIRST_DESCRIPTOR_SECTOR: u32 = 16;
const FIRST_FREE_SECTOR: u32 = 19;

const PRIMARY_LABEL_LEN: usize = 32;
const JOLIET_LABEL_CHARS: usize = 16;
const PRIMARY_DIR_NAME_LEN: usize = 31;
const PRIMARY_FILE_NAME_LEN: usize = 30;
const JOLIET_NAME_CHARS: usize = 64;

const SYSTEM_ID: &str = "LINUX";
const APPLICATION_ID: &str = "CLOUD-INIT-SEED";

const FLAG_DIRECTORY: u8 = 0x02;

/// Writer for ISO 9660 + Joliet images
#[derive(Debug, Clone, Default)]
pub struct Iso9660Writer {
    timestamp: Option<DateTime<Utc>>,
}

impl Iso9660Writer {
    /// Writer stamping images from `SOURCE_DATE_EPOCH`, or the current time
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer stamping images with a fixed time
    pub fn with_timestamp(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(timestamp),
        }
    }
}

impl ImageWriter for Iso9660Writer {
    type Handle = IsoBuilder;

    fn open(&self) -> io::Result<IsoBuilder> {
        let timestamp = match self.timestamp {
            Some(timestamp) => timestamp,
            None => timestamp_from_env()?,
        };
        trace!("Opened ISO image stamped {}", timestamp);
        Ok(IsoBuilder {
            timestamp: check_date_range(timestamp)?,
            files: Vec::new(),
            paths: PathSet::default(),
        })
    }
}

fn invalid_input(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

fn timestamp_from_env() -> io::Result<DateTime<Utc>> {
    match std::env::var(SOURCE_DATE_EPOCH) {
        Ok(value) => parse_source_date_epoch(&value),
        Err(std::env::VarError::NotPresent) => Ok(Utc::now()),
        Err(e) => Err(invalid_input(format!("{}: {}", SOURCE_DATE_EPOCH, e))),
    }
}

/// Parse a `SOURCE_DATE_EPOCH` value (seconds since the Unix epoch)
///
/// Volume dates store the year as an offset from 1900 in one byte, so the
/// representable range is 1900 to 2155.
pub fn parse_source_date_epoch(value: &str) -> io::Result<DateTime<Utc>> {
    let seconds: i64 = value.trim().parse().map_err(|e| {
        invalid_input(format!("invalid {} {:?}: {}", SOURCE_DATE_EPOCH, value, e))
    })?;

    let timestamp = Utc.timestamp_opt(seconds, 0).single().ok_or_else(|| {
        invalid_input(format!("{} {} is not a valid time", SOURCE_DATE_EPOCH, seconds))
    })?;
    check_date_range(timestamp)
}

/// Reject times whose year does not fit a volume date
fn check_date_range(timestamp: DateTime<Utc>) -> io::Result<DateTime<Utc>> {
    if (1900..=2155).contains(&timestamp.year()) {
        Ok(timestamp)
    } else {
        Err(invalid_input(format!(
            "{} is outside the ISO 9660 date range",
            timestamp
        )))
    }
}

/// An ISO image being populated
#[derive(Debug)]
pub struct IsoBuilder {
    timestamp: DateTime<Utc>,
    files: Vec<IsoFile>,
    paths: PathSet,
}

#[derive(Debug)]
struct IsoFile {
    path: Vec<String>,
    content: Vec<u8>,
}

/// Split an image path into validated components
pub(crate) fn split_path(path: &str) -> io::Result<Vec<String>> {
    let mut components = Vec::new();
    for component in path.split('/') {
        if component.is_empty() {
            return Err(invalid_input(format!(
                "empty path component in {:?}",
                path
            )));
        }
        if component == "." || component == ".." {
            return Err(invalid_input(format!(
                "relative component {:?} in {:?}",
                component, path
            )));
        }
        if component
            .chars()
            .any(|c| c.is_control() || matches!(c, '*' | ':' | ';' | '?' | '\\'))
        {
            return Err(invalid_input(format!(
                "unsupported character in {:?}",
                component
            )));
        }
        if component.encode_utf16().count() > JOLIET_NAME_CHARS {
            return Err(invalid_input(format!(
                "name {:?} exceeds {} characters",
                component, JOLIET_NAME_CHARS
            )));
        }
        components.push(component.to_string());
    }
    Ok(components)
}

/// Files and implied directories of an image
///
/// Shared by every image writer so a manifest accepts exactly the paths an
/// ISO image does.
#[derive(Debug, Default)]
pub(crate) struct PathSet {
    files: BTreeSet<Vec<String>>,
    dirs: BTreeSet<Vec<String>>,
}

impl PathSet {
    /// Record a file path, creating its parent directories
    pub(crate) fn insert(&mut self, path: &str) -> io::Result<Vec<String>> {
        let components = split_path(path)?;

        if self.files.contains(&components) || self.dirs.contains(&components) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("duplicate path {:?}", path),
            ));
        }
        for depth in 1..components.len() {
            if self.files.contains(&components[..depth]) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!(
                        "{:?} is a file, cannot hold {:?}",
                        components[..depth].join("/"),
                        path
                    ),
                ));
            }
        }

        for depth in 1..components.len() {
            self.dirs.insert(components[..depth].to_vec());
        }
        self.files.insert(components.clone());
        Ok(components)
    }
}

impl ImageHandle for IsoBuilder {
    fn add_file(&mut self, content: &[u8], path: &str) -> io::Result<()> {
        if u32::try_from(content.len()).is_err() {
            return Err(invalid_input(format!("{:?} is too large", path)));
        }
        let components = self.paths.insert(path)?;
        self.files.push(IsoFile {
            path: components,
            content: content.to_vec(),
        });
        Ok(())
    }

    fn finalize(&mut self, sink: &mut dyn Write, label: &str) -> io::Result<()> {
        let image = self.build(label)?;
        debug!(
            "Writing ISO image '{}': {} files, {} sectors",
            label,
            self.files.len(),
            image.len() / SECTOR_SIZE
        );
        sink.write_all(&image)?;
        sink.flush()
    }
}

/// Naming scheme of a directory tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Primary,
    Joliet,
}

#[derive(Debug)]
enum Target {
    Dir(usize),
    File(usize),
}

#[derive(Debug)]
struct Child {
    ident: Vec<u8>,
    target: Target,
}

#[derive(Debug)]
struct DirNode {
    ident: Vec<u8>,
    parent: usize,
    children: Vec<Child>,
    location: u32,
    size: u32,
}

/// Directory hierarchy in path table order
#[derive(Debug)]
struct Tree {
    scheme: Scheme,
    dirs: Vec<DirNode>,
}

fn ucs2_be(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

fn d_chars(s: &str, keep: &[char]) -> String {
    s.chars()
        .map(|c| c.to_ascii_uppercase())
        .map(|c| {
            if c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || keep.contains(&c) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn primary_dir_name(name: &str) -> String {
    d_chars(name, &[]).chars().take(PRIMARY_DIR_NAME_LEN).collect()
}

fn primary_file_name(name: &str) -> (String, String) {
    let (base, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    let ext: String = d_chars(ext, &[]).chars().take(3).collect();
    let base: String = d_chars(base, &[])
        .chars()
        .take(PRIMARY_FILE_NAME_LEN - 1 - ext.len())
        .collect();
    (base, ext)
}

/// Make `base` unique among `used` by replacing its tail with a counter
fn unique_name(base: &str, suffix: &str, max: usize, used: &mut BTreeSet<String>) -> String {
    let mut candidate = format!("{}{}", base, suffix);
    let mut counter = 1u32;
    while used.contains(&candidate) {
        let tag = format!("_{}", counter);
        let keep = max.saturating_sub(tag.len()).min(base.len());
        candidate = format!("{}{}{}", &base[..keep], tag, suffix);
        counter += 1;
    }
    used.insert(candidate.clone());
    candidate
}

impl Tree {
    fn build(scheme: Scheme, builder: &IsoBuilder) -> Self {
        let mut dir_paths: Vec<Vec<String>> = vec![Vec::new()];
        let mut dirs = vec![DirNode {
            ident: vec![0],
            parent: 0,
            children: Vec::new(),
            location: 0,
            size: 0,
        }];

        let mut index = 0;
        while index < dirs.len() {
            let path = dir_paths[index].clone();
            let mut used = BTreeSet::new();
            let mut children = Vec::new();

            for sub in builder
                .paths
                .dirs
                .iter()
                .filter(|d| d.len() == path.len() + 1 && d.starts_with(&path))
            {
                let name = &sub[path.len()];
                let ident = match scheme {
                    Scheme::Primary => unique_name(
                        &primary_dir_name(name),
                        "",
                        PRIMARY_DIR_NAME_LEN,
                        &mut used,
                    )
                    .into_bytes(),
                    Scheme::Joliet => ucs2_be(name),
                };
                children.push((ident, Some(sub.clone()), None));
            }

            for (file_index, file) in builder.files.iter().enumerate() {
                let Some((name, parent)) = file.path.split_last() else {
                    continue;
                };
                if parent != path.as_slice() {
                    continue;
                }
                let ident = match scheme {
                    Scheme::Primary => {
                        let (base, ext) = primary_file_name(name);
                        let suffix = format!(".{}", ext);
                        let max = PRIMARY_FILE_NAME_LEN - ext.len() - 1;
                        let mut unique = unique_name(&base, &suffix, max, &mut used);
                        unique.push_str(";1");
                        unique.into_bytes()
                    }
                    Scheme::Joliet => ucs2_be(&format!("{};1", name)),
                };
                children.push((ident, None, Some(file_index)));
            }

            children.sort_by(|a, b| a.0.cmp(&b.0));

            for (ident, sub, file_index) in children {
                let target = match (sub, file_index) {
                    (Some(sub), _) => {
                        dirs.push(DirNode {
                            ident: ident.clone(),
                            parent: index,
                            children: Vec::new(),
                            location: 0,
                            size: 0,
                        });
                        dir_paths.push(sub);
                        Target::Dir(dirs.len() - 1)
                    }
                    (None, Some(file_index)) => Target::File(file_index),
                    (None, None) => continue,
                };
                dirs[index].children.push(Child { ident, target });
            }

            index += 1;
        }

        Self { scheme, dirs }
    }

    fn record_lengths(dir: &DirNode) -> impl Iterator<Item = usize> + '_ {
        [1usize, 1]
            .into_iter()
            .chain(dir.children.iter().map(|c| c.ident.len()))
            .map(record_len)
    }

    fn compute_sizes(&mut self) {
        for dir in &mut self.dirs {
            let len = packed_len(Self::record_lengths(dir));
            dir.size = sectors_for(len) * SECTOR_SIZE as u32;
        }
    }

    fn assign_locations(&mut self, mut next: u32) -> u32 {
        for dir in &mut self.dirs {
            dir.location = next;
            next += dir.size / SECTOR_SIZE as u32;
        }
        next
    }

    fn path_table_len(&self) -> usize {
        self.dirs
            .iter()
            .map(|d| 8 + d.ident.len() + d.ident.len() % 2)
            .sum()
    }

    fn path_table(&self, big_endian: bool) -> Vec<u8> {
        let mut table = Vec::with_capacity(self.path_table_len());
        for dir in &self.dirs {
            table.push(dir.ident.len() as u8);
            table.push(0);
            let parent = (dir.parent + 1) as u16;
            if big_endian {
                table.extend_from_slice(&dir.location.to_be_bytes());
                table.extend_from_slice(&parent.to_be_bytes());
            } else {
                table.extend_from_slice(&dir.location.to_le_bytes());
                table.extend_from_slice(&parent.to_le_bytes());
            }
            table.extend_from_slice(&dir.ident);
            if dir.ident.len() % 2 == 1 {
                table.push(0);
            }
        }
        table
    }

    fn extent(&self, index: usize, files: &[FileExtent], date: &[u8; 7]) -> Vec<u8> {
        let dir = &self.dirs[index];
        let parent = &self.dirs[dir.parent];

        let mut records = vec![
            dir_record(&[0], dir.location, dir.size, true, date),
            dir_record(&[1], parent.location, parent.size, true, date),
        ];
        for child in &dir.children {
            records.push(match child.target {
                Target::Dir(sub) => {
                    let sub = &self.dirs[sub];
                    dir_record(&child.ident, sub.location, sub.size, true, date)
                }
                Target::File(file) => {
                    let extent = &files[file];
                    dir_record(&child.ident, extent.location, extent.size, false, date)
                }
            });
        }

        let mut extent = vec![0u8; dir.size as usize];
        let mut offset = 0;
        for record in records {
            offset = next_offset(offset, record.len());
            extent[offset..offset + record.len()].copy_from_slice(&record);
            offset += record.len();
        }
        extent
    }
}

#[derive(Debug, Clone, Copy)]
struct FileExtent {
    location: u32,
    size: u32,
}

fn record_len(ident_len: usize) -> usize {
    33 + ident_len + (ident_len + 1) % 2
}

/// Records never straddle a sector boundary
fn next_offset(offset: usize, len: usize) -> usize {
    if offset % SECTOR_SIZE + len > SECTOR_SIZE {
        offset.div_ceil(SECTOR_SIZE) * SECTOR_SIZE
    } else {
        offset
    }
}

fn packed_len(lens: impl Iterator<Item = usize>) -> usize {
    lens.fold(0, |offset, len| next_offset(offset, len) + len)
}

fn sectors_for(len: usize) -> u32 {
    len.div_ceil(SECTOR_SIZE) as u32
}

fn put_both_u16(buf: &mut [u8], value: u16) {
    buf[0..2].copy_from_slice(&value.to_le_bytes());
    buf[2..4].copy_from_slice(&value.to_be_bytes());
}

fn put_both_u32(buf: &mut [u8], value: u32) {
    buf[0..4].copy_from_slice(&value.to_le_bytes());
    buf[4..8].copy_from_slice(&value.to_be_bytes());
}

fn dir_record(ident: &[u8], location: u32, size: u32, is_dir: bool, date: &[u8; 7]) -> Vec<u8> {
    let len = record_len(ident.len());
    let mut record = vec![0u8; len];
    record[0] = len as u8;
    put_both_u32(&mut record[2..10], location);
    put_both_u32(&mut record[10..18], size);
    record[18..25].copy_from_slice(date);
    record[25] = if is_dir { FLAG_DIRECTORY } else { 0 };
    put_both_u16(&mut record[28..32], 1);
    record[32] = ident.len() as u8;
    record[33..33 + ident.len()].copy_from_slice(ident);
    record
}

fn record_date(ts: &DateTime<Utc>) -> [u8; 7] {
    [
        (ts.year() - 1900) as u8,
        ts.month() as u8,
        ts.day() as u8,
        ts.hour() as u8,
        ts.minute() as u8,
        ts.second() as u8,
        0,
    ]
}

fn descriptor_date(ts: Option<&DateTime<Utc>>) -> [u8; 17] {
    let mut date = [b'0'; 17];
    date[16] = 0;
    if let Some(ts) = ts {
        let digits = ts.format("%Y%m%d%H%M%S00").to_string();
        date[..16].copy_from_slice(&digits.as_bytes()[..16]);
    }
    date
}

/// Space padded text field in the encoding of the scheme
fn text_field(scheme: Scheme, text: &str, len: usize) -> Vec<u8> {
    let mut field = Vec::with_capacity(len);
    match scheme {
        Scheme::Primary => {
            field.extend(text.bytes().take(len));
            field.resize(len, b' ');
        }
        Scheme::Joliet => {
            for unit in text.encode_utf16().take(len / 2) {
                field.extend_from_slice(&unit.to_be_bytes());
            }
            while field.len() + 2 <= len {
                field.extend_from_slice(&[0x00, 0x20]);
            }
            field.resize(len, 0);
        }
    }
    field
}

/// Volume identifier of the primary descriptor
///
/// Printable ASCII is kept verbatim, case included, since guests match the
/// seed label exactly. Anything else becomes `_`.
pub fn primary_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_graphic() { c } else { '_' })
        .take(PRIMARY_LABEL_LEN)
        .collect()
}

/// Volume identifier of the Joliet descriptor
pub fn joliet_label(label: &str) -> String {
    char::decode_utf16(label.encode_utf16().take(JOLIET_LABEL_CHARS))
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

struct Descriptor<'a> {
    tree: &'a Tree,
    label: String,
    volume_sectors: u32,
    l_table: u32,
    m_table: u32,
}

impl IsoBuilder {
    fn build(&self, label: &str) -> io::Result<Vec<u8>> {
        let mut primary = Tree::build(Scheme::Primary, self);
        let mut joliet = Tree::build(Scheme::Joliet, self);
        primary.compute_sizes();
        joliet.compute_sizes();

        let mut next = FIRST_FREE_SECTOR;
        let primary_tables = sectors_for(primary.path_table_len());
        let joliet_tables = sectors_for(joliet.path_table_len());
        let primary_l = next;
        let primary_m = primary_l + primary_tables;
        let joliet_l = primary_m + primary_tables;
        let joliet_m = joliet_l + joliet_tables;
        next = joliet_m + joliet_tables;

        next = primary.assign_locations(next);
        next = joliet.assign_locations(next);

        let mut extents = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let size = u32::try_from(file.content.len())
                .map_err(|_| invalid_input(format!("{} is too large", file.path.join("/"))))?;
            let location = if size == 0 { 0 } else { next };
            next = next
                .checked_add(sectors_for(file.content.len()))
                .ok_or_else(|| invalid_input("image exceeds the ISO 9660 size limit".into()))?;
            extents.push(FileExtent { location, size });
        }
        let volume_sectors = next;

        let mut image = vec![0u8; volume_sectors as usize * SECTOR_SIZE];
        let date = record_date(&self.timestamp);

        for (sector, descriptor) in [
            (
                FIRST_DESCRIPTOR_SECTOR,
                Descriptor {
                    tree: &primary,
                    label: primary_label(label),
                    volume_sectors,
                    l_table: primary_l,
                    m_table: primary_m,
                },
            ),
            (
                FIRST_DESCRIPTOR_SECTOR + 1,
                Descriptor {
                    tree: &joliet,
                    label: joliet_label(label),
                    volume_sectors,
                    l_table: joliet_l,
                    m_table: joliet_m,
                },
            ),
        ] {
            let bytes = self.volume_descriptor(&descriptor, &date);
            write_at(&mut image, sector, &bytes);
        }

        let mut terminator = [0u8; 7];
        terminator[0] = 255;
        terminator[1..6].copy_from_slice(STANDARD_ID);
        terminator[6] = 1;
        write_at(&mut image, FIRST_DESCRIPTOR_SECTOR + 2, &terminator);

        write_at(&mut image, primary_l, &primary.path_table(false));
        write_at(&mut image, primary_m, &primary.path_table(true));
        write_at(&mut image, joliet_l, &joliet.path_table(false));
        write_at(&mut image, joliet_m, &joliet.path_table(true));

        for tree in [&primary, &joliet] {
            for (index, dir) in tree.dirs.iter().enumerate() {
                write_at(&mut image, dir.location, &tree.extent(index, &extents, &date));
            }
        }

        for (file, extent) in self.files.iter().zip(&extents) {
            if extent.size > 0 {
                write_at(&mut image, extent.location, &file.content);
            }
        }

        Ok(image)
    }

    fn volume_descriptor(&self, desc: &Descriptor<'_>, date: &[u8; 7]) -> Vec<u8> {
        let scheme = desc.tree.scheme;
        let mut sector = vec![0u8; SECTOR_SIZE];

        sector[0] = match scheme {
            Scheme::Primary => 1,
            Scheme::Joliet => 2,
        };
        sector[1..6].copy_from_slice(STANDARD_ID);
        sector[6] = 1;
        sector[8..40].copy_from_slice(&text_field(scheme, SYSTEM_ID, 32));
        sector[40..72].copy_from_slice(&text_field(scheme, &desc.label, 32));
        put_both_u32(&mut sector[80..88], desc.volume_sectors);
        if scheme == Scheme::Joliet {
            sector[88..91].copy_from_slice(JOLIET_ESCAPE);
        }
        put_both_u16(&mut sector[120..124], 1);
        put_both_u16(&mut sector[124..128], 1);
        put_both_u16(&mut sector[128..132], SECTOR_SIZE as u16);
        put_both_u32(&mut sector[132..140], desc.tree.path_table_len() as u32);
        sector[140..144].copy_from_slice(&desc.l_table.to_le_bytes());
        sector[148..152].copy_from_slice(&desc.m_table.to_be_bytes());

        let root = &desc.tree.dirs[0];
        sector[156..190].copy_from_slice(&dir_record(&[0], root.location, root.size, true, date));

        // Volume set, publisher, preparer, application
        sector[190..318].copy_from_slice(&text_field(scheme, "", 128));
        sector[318..446].copy_from_slice(&text_field(scheme, "", 128));
        sector[446..574].copy_from_slice(&text_field(scheme, "", 128));
        sector[574..702].copy_from_slice(&text_field(scheme, APPLICATION_ID, 128));
        // Copyright, abstract, bibliographic file identifiers
        sector[702..739].copy_from_slice(&text_field(scheme, "", 37));
        sector[739..776].copy_from_slice(&text_field(scheme, "", 37));
        sector[776..813].copy_from_slice(&text_field(scheme, "", 37));

        let stamp = descriptor_date(Some(&self.timestamp));
        sector[813..830].copy_from_slice(&stamp);
        sector[830..847].copy_from_slice(&stamp);
        sector[847..864].copy_from_slice(&descriptor_date(None));
        sector[864..881].copy_from_slice(&stamp);
        sector[881] = 1;

        sector
    }
}

fn write_at(image: &mut [u8], sector: u32, bytes: &[u8]) {
    let start = sector as usize * SECTOR_SIZE;
    image[start..start + bytes.len()].copy_from_slice(bytes);
}
