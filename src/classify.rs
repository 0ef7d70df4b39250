//! Classification of central-directory entries into the magic-entry bitmask
//! and the three catalogs (messages, attachments, contacts).
//!
//! Grounded directly on the central-directory walk in `olm_open_file` and on
//! `is_message`/`is_attachment`/`ends_with_attachment_suffix` in the original
//! C implementation; the string tests below are the same tests, just spelled
//! with `&str` methods instead of `strncmp`/`strstr`/`strcasecmp`.

use crate::catalog::{
    ArchiveEntry, ArchiveIndex, MAGIC_BIT_ACCOUNTS_DIR, MAGIC_BIT_CATEGORIES_XML,
    MAGIC_BIT_LOCAL_DIR,
};

const MESSAGES_DIR_PREFIX: &str = "Local/com.microsoft.__Messages";
const ATTACHMENT_MARKER: &str = "__message_attachment__";
const ATTACHMENTS_DIR_MARKER: &str = "com.microsoft.__Attachments";
const CATEGORIES_PATH: &str = "Categories.xml";
const CONTACTS_PATH: &str = "Local/Address Book/Contacts.xml";

/// Where a classified entry belongs, or that it should be discarded.
enum Classification {
    Message,
    Attachment,
    Contact,
    MagicDirectory(u8),
    CategoriesMarker,
    Discard,
}

fn classify(entry: &ArchiveEntry) -> Classification {
    if entry.raw_path == CATEGORIES_PATH {
        return Classification::CategoriesMarker;
    }
    if entry.raw_path == CONTACTS_PATH {
        return Classification::Contact;
    }
    if entry.is_directory {
        let mut bits = 0u8;
        if entry.raw_path.starts_with("Accounts") {
            bits |= MAGIC_BIT_ACCOUNTS_DIR;
        }
        if entry.raw_path.starts_with("Local") {
            bits |= MAGIC_BIT_LOCAL_DIR;
        }
        return Classification::MagicDirectory(bits);
    }
    if is_message(entry) {
        return Classification::Message;
    }
    if is_attachment(entry) {
        return Classification::Attachment;
    }
    Classification::Discard
}

/// An entry is a message if it lives directly under the messages directory,
/// its filename carries the attachment marker (messages and their attachment
/// stubs share this marker; only the ones that *aren't* also under the
/// attachments directory are messages), and it ends in `.xml`.
fn is_message(entry: &ArchiveEntry) -> bool {
    if entry.filename.is_empty() || entry.directory.is_empty() {
        return false;
    }
    if !entry.directory.starts_with(MESSAGES_DIR_PREFIX) {
        return false;
    }
    if !entry.filename.contains(ATTACHMENT_MARKER) {
        return false;
    }
    if entry.directory.contains(ATTACHMENTS_DIR_MARKER) {
        return false;
    }
    entry.filename.to_ascii_lowercase().ends_with(".xml")
}

/// An entry is an attachment if it lives under the messages directory, in a
/// subdirectory whose path carries the attachments marker, its filename does
/// *not* carry the message-attachment-stub marker, and its filename ends in
/// the attachment suffix (an underscore followed only by digits and dots).
fn is_attachment(entry: &ArchiveEntry) -> bool {
    if entry.filename.is_empty() || entry.directory.is_empty() {
        return false;
    }
    if !entry.directory.starts_with(MESSAGES_DIR_PREFIX) {
        return false;
    }
    if entry.filename.contains(ATTACHMENT_MARKER) {
        return false;
    }
    if !entry.directory.contains(ATTACHMENTS_DIR_MARKER) {
        return false;
    }
    ends_with_attachment_suffix(&entry.filename)
}

/// True if `filename` has a final `_` followed only by ASCII digits and
/// dots, e.g. `something_2.3`. An attachment's filename is suffixed with a
/// disambiguating counter this way when an account holds more than one
/// attachment with the same display name.
fn ends_with_attachment_suffix(filename: &str) -> bool {
    match filename.rfind('_') {
        Some(idx) => filename[idx + 1..]
            .bytes()
            .all(|b| b.is_ascii_digit() || b == b'.'),
        None => false,
    }
}

/// Walks `entries`, sorting each into the returned [`ArchiveIndex`].
pub fn build_index(entries: Vec<ArchiveEntry>) -> ArchiveIndex {
    let mut index = ArchiveIndex::default();

    for entry in entries {
        match classify(&entry) {
            Classification::Message => index.messages.push(entry),
            Classification::Attachment => index.attachments.push(entry),
            Classification::Contact => index.contacts.push(entry),
            Classification::MagicDirectory(bits) => index.magic_bits |= bits,
            Classification::CategoriesMarker => index.magic_bits |= MAGIC_BIT_CATEGORIES_XML,
            Classification::Discard => {}
        }
    }

    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(directory: &str, filename: &str) -> ArchiveEntry {
        let raw_path = if directory.is_empty() {
            filename.to_string()
        } else {
            format!("{directory}/{filename}")
        };
        ArchiveEntry {
            raw_path,
            directory: directory.to_string(),
            filename: filename.to_string(),
            is_directory: false,
            uncompressed_size: 0,
            compressed_size: 0,
            compression_method: 0,
            crc32: 0,
            flags: 0,
            local_header_offset: 0,
        }
    }

    #[test]
    fn recognizes_a_message() {
        let e = entry(
            "Local/com.microsoft.__Messages/0/Messages",
            "__message_attachment__1.xml",
        );
        assert!(is_message(&e));
        assert!(!is_attachment(&e));
    }

    #[test]
    fn recognizes_an_attachment() {
        let e = entry(
            "Local/com.microsoft.__Messages/0/com.microsoft.__Attachments",
            "report.pdf_1",
        );
        assert!(is_attachment(&e));
        assert!(!is_message(&e));
    }

    #[test]
    fn rejects_suffix_with_letters() {
        assert!(!ends_with_attachment_suffix("report_final"));
        assert!(ends_with_attachment_suffix("report_1.2"));
    }

    #[test]
    fn categories_and_magic_dirs_set_bits() {
        let mut index = ArchiveIndex::default();
        index.magic_bits |= MAGIC_BIT_CATEGORIES_XML;
        index.magic_bits |= MAGIC_BIT_ACCOUNTS_DIR;
        index.magic_bits |= MAGIC_BIT_LOCAL_DIR;
        assert!(index.is_valid_olm());
    }
}
