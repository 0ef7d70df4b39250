//! The in-memory catalog produced by opening an OLM archive: retained entry
//! descriptors, split into directory/filename components, grouped into the
//! three catalogs spec.md describes (messages, attachments, contacts).

use crate::central_directory::RawCentralDirectoryEntry;

/// A central-directory entry that survived classification, with its raw
/// path already split into directory/filename per spec.md §3's invariant:
///
/// - If the entry is a directory, the trailing slash is stripped, `filename`
///   is empty, and `directory` is the stripped path.
/// - Otherwise `filename` is the substring after the last `/` (or the whole
///   path if there's none), and `directory` is everything before it.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub raw_path: String,
    pub directory: String,
    pub filename: String,
    pub is_directory: bool,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub compression_method: u16,
    pub crc32: u32,
    pub flags: u16,
    pub local_header_offset: u64,
}

impl ArchiveEntry {
    pub fn from_raw(raw: RawCentralDirectoryEntry) -> Self {
        let is_directory = raw.is_directory();

        let (directory, filename) = if is_directory {
            let stripped = raw.path.strip_suffix('/').unwrap_or(&raw.path);
            (stripped.to_string(), String::new())
        } else {
            match raw.path.rfind('/') {
                Some(idx) => (raw.path[..idx].to_string(), raw.path[idx + 1..].to_string()),
                None => (String::new(), raw.path.clone()),
            }
        };

        Self {
            raw_path: raw.path,
            directory,
            filename,
            is_directory,
            uncompressed_size: raw.uncompressed_size,
            compressed_size: raw.compressed_size,
            compression_method: raw.compression_method,
            crc32: raw.crc32,
            flags: raw.flags,
            local_header_offset: raw.local_header_offset,
        }
    }
}

/// Magic-entry bits observed while walking the central directory. Their
/// joint presence (value [`ALL_MAGIC_BITS`]) is what distinguishes an OLM
/// archive from an arbitrary ZIP file (spec.md §4.2).
pub const MAGIC_BIT_ACCOUNTS_DIR: u8 = 0b001;
pub const MAGIC_BIT_LOCAL_DIR: u8 = 0b010;
pub const MAGIC_BIT_CATEGORIES_XML: u8 = 0b100;
pub const ALL_MAGIC_BITS: u8 = 0b111;

/// The three catalogs an opened archive retains, plus the magic bitmask
/// accumulated while walking the central directory.
#[derive(Debug, Default)]
pub struct ArchiveIndex {
    pub messages: Vec<ArchiveEntry>,
    pub attachments: Vec<ArchiveEntry>,
    pub contacts: Vec<ArchiveEntry>,
    pub magic_bits: u8,
}

impl ArchiveIndex {
    pub fn is_valid_olm(&self) -> bool {
        self.magic_bits == ALL_MAGIC_BITS
    }
}
