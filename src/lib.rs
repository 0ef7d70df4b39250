//! olm-archive reads mail messages and attachments out of Outlook-for-Mac
//! `.olm` archives: a bespoke ZIP/ZIP64 central-directory walker that knows
//! the OLM format's internal path conventions, without pulling in a
//! general-purpose ZIP crate.
//!
//! ```no_run
//! use olm_archive::{OlmArchive, OlmOptions};
//!
//! let mut archive = OlmArchive::open("exported.olm", OlmOptions::empty())?;
//! for index in 0..archive.message_count() {
//!     let message = archive.get_message_at(index)?;
//!     println!("{}: {}", message.from, message.subject);
//!     for attachment in &message.attachments {
//!         let dest = format!("/tmp/{}", attachment.filename);
//!         archive.extract_attachment(attachment, dest.as_ref())?;
//!     }
//! }
//! # Ok::<(), olm_archive::OlmError>(())
//! ```
//!
//! An OLM file is a ZIP archive whose central directory is walked once, at
//! open time, into three catalogs: mail messages, attachments, and contacts
//! (the last is routed but not parsed — see [`DESIGN.md`] in the repository
//! root). A message's XML body and an attachment's bytes are only read from
//! disk on demand, by seeking back into the same file handle the catalog was
//! built from.

mod attachment;
mod byte_reader;
mod catalog;
mod central_directory;
mod classify;
mod message;
mod result;

use std::fs::File;
use std::path::Path;

use byte_reader::ByteReader;
use catalog::ArchiveIndex;

pub use catalog::ArchiveEntry;
pub use message::{
    Attachment, MailMessage, MESSAGE_PRIORITY_HIGH, MESSAGE_PRIORITY_HIGHEST,
    MESSAGE_PRIORITY_LOW, MESSAGE_PRIORITY_LOWEST, MESSAGE_PRIORITY_NORMAL,
};
pub use result::{OlmError, OlmResult};

/// Open-time options bitmask, mirroring `OLM_OPT_*` from the original API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OlmOptions(u32);

impl OlmOptions {
    /// Use lenient XML parsing: recover from malformed message bodies
    /// instead of failing `get_message_at` outright.
    pub const IGNORE_ERRORS: OlmOptions = OlmOptions(0x01);

    pub const fn empty() -> Self {
        OlmOptions(0)
    }

    pub const fn contains(self, flag: OlmOptions) -> bool {
        (self.0 & flag.0) == flag.0
    }
}

impl std::ops::BitOr for OlmOptions {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        OlmOptions(self.0 | rhs.0)
    }
}

/// Magic bits required for a ZIP file to be accepted as an OLM archive: the
/// `Accounts` directory, the `Local` directory, and `Categories.xml`.
const ALL_MAGIC_BITS: u8 = catalog::ALL_MAGIC_BITS;

/// An opened OLM archive.
///
/// Holds the backing file and the catalogs built while walking the central
/// directory at open time. Not `Sync`: every read seeks the same underlying
/// file descriptor, so concurrent use from multiple threads would race on
/// its position. Open a second handle on the same path instead.
#[derive(Debug)]
pub struct OlmArchive {
    reader: ByteReader,
    index: ArchiveIndex,
    options: OlmOptions,
}

impl OlmArchive {
    /// Opens `path` as an OLM archive.
    ///
    /// Fails with [`OlmError::NotOlmFile`] if the file isn't a ZIP archive,
    /// or if its central directory doesn't carry the three magic entries
    /// that identify an OLM export. Fails with [`OlmError::FileCorrupted`]
    /// if the ZIP framing itself is malformed.
    pub fn open<P: AsRef<Path>>(path: P, options: OlmOptions) -> OlmResult<Self> {
        let file = File::open(path)?;
        let mut reader = ByteReader::new(file);

        let eocd = central_directory::find_and_parse_eocd(&mut reader)?;
        let eocdr_offset = reader.len()? - 22 - eocd.comment.len() as u64;

        let locator = central_directory::try_parse_zip64_locator(&mut reader, eocdr_offset)?;

        let (total_entries, central_directory_offset) = match &locator {
            Some(locator) => {
                let zip64_eocd =
                    central_directory::parse_zip64_eocd(&mut reader, locator.zip64_eocdr_offset)?;
                (zip64_eocd.entries, zip64_eocd.central_directory_offset)
            }
            None => (
                eocd.entries as u64,
                eocd.central_directory_offset as u64,
            ),
        };

        reader.seek_from_start(central_directory_offset)?;

        let mut raw_entries = Vec::with_capacity(total_entries as usize);
        for _ in 0..total_entries {
            raw_entries.push(central_directory::read_next_entry(&mut reader)?);
        }

        let entries: Vec<catalog::ArchiveEntry> = raw_entries
            .into_iter()
            .map(catalog::ArchiveEntry::from_raw)
            .collect();

        let index = classify::build_index(entries);
        if index.magic_bits != ALL_MAGIC_BITS {
            return Err(OlmError::NotOlmFile(
                "archive is missing the Accounts/Local/Categories.xml magic entries",
            ));
        }

        log::debug!(
            "opened OLM archive with {} messages, {} attachments",
            index.messages.len(),
            index.attachments.len()
        );

        Ok(Self {
            reader,
            index,
            options,
        })
    }

    /// Number of messages in the archive.
    pub fn message_count(&self) -> u64 {
        self.index.messages.len() as u64
    }

    /// Materializes the message at `index` in the messages catalog.
    ///
    /// Unlike the original C API, which returns `NO_MEMORY` for an
    /// out-of-range index, this returns [`OlmError::InvalidParameter`].
    pub fn get_message_at(&mut self, index: u64) -> OlmResult<MailMessage> {
        let entry = self
            .index
            .messages
            .get(index as usize)
            .ok_or(OlmError::InvalidParameter("message index out of range"))?;

        let ignore_errors = self.options.contains(OlmOptions::IGNORE_ERRORS);
        message::read_message(&mut self.reader, entry, ignore_errors)
    }

    /// Extracts `attachment` to `dest_path`, overwriting any existing file.
    ///
    /// On a CRC mismatch the partially written destination file is removed
    /// before the error is returned.
    pub fn extract_attachment(&mut self, attachment: &Attachment, dest_path: &Path) -> OlmResult<()> {
        attachment::extract_attachment(&mut self.reader, &self.index.attachments, attachment, dest_path)
    }

    /// Raw catalog entries for the archive's messages, for callers that want
    /// to inspect archive structure without materializing every message.
    pub fn message_entries(&self) -> &[ArchiveEntry] {
        &self.index.messages
    }

    /// Raw catalog entries for the archive's attachments.
    pub fn attachment_entries(&self) -> &[ArchiveEntry] {
        &self.index.attachments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_bitor_combines_flags() {
        let opts = OlmOptions::empty() | OlmOptions::IGNORE_ERRORS;
        assert!(opts.contains(OlmOptions::IGNORE_ERRORS));
    }

    #[test]
    fn open_rejects_a_missing_file() {
        let err = OlmArchive::open("/nonexistent/path.olm", OlmOptions::empty()).unwrap_err();
        assert!(matches!(err, OlmError::Io(_)));
    }
}
