//! End-to-end tests against synthesized OLM-shaped ZIP archives.
//!
//! There's no `zip`/`unzip` binary or checked-in fixture archive to lean on
//! here, so each test builds the minimal ZIP bytes it needs by hand: a local
//! header plus payload per entry, followed by a central directory and an
//! EOCD record. `ZipBuilder` below is the shared plumbing for that.

use std::fs::File;
use std::io::Write;

use olm_archive::{OlmArchive, OlmError, OlmOptions};

struct PlannedEntry {
    path: String,
    data: Vec<u8>,
    is_directory: bool,
    local_header_offset: u32,
}

struct ZipBuilder {
    body: Vec<u8>,
    entries: Vec<PlannedEntry>,
}

impl ZipBuilder {
    fn new() -> Self {
        Self {
            body: Vec::new(),
            entries: Vec::new(),
        }
    }

    fn add_dir(&mut self, path: &str) -> &mut Self {
        self.add_entry(path, &[], true)
    }

    fn add_file(&mut self, path: &str, data: &[u8]) -> &mut Self {
        self.add_entry(path, data, false)
    }

    fn add_entry(&mut self, path: &str, data: &[u8], is_directory: bool) -> &mut Self {
        let offset = self.body.len() as u32;
        let crc = crc32fast::hash(data);

        self.body.extend_from_slice(&0x0403_4B50u32.to_le_bytes());
        self.body.extend_from_slice(&20u16.to_le_bytes()); // version needed
        self.body.extend_from_slice(&0u16.to_le_bytes()); // flags
        self.body.extend_from_slice(&0u16.to_le_bytes()); // method: stored
        self.body.extend_from_slice(&0u16.to_le_bytes()); // mod time
        self.body.extend_from_slice(&0u16.to_le_bytes()); // mod date
        self.body.extend_from_slice(&crc.to_le_bytes());
        self.body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.body.extend_from_slice(&(path.len() as u16).to_le_bytes());
        self.body.extend_from_slice(&0u16.to_le_bytes()); // extra field length
        self.body.extend_from_slice(path.as_bytes());
        self.body.extend_from_slice(data);

        self.entries.push(PlannedEntry {
            path: path.to_string(),
            data: data.to_vec(),
            is_directory,
            local_header_offset: offset,
        });
        self
    }

    fn build(&self) -> Vec<u8> {
        let mut out = self.body.clone();
        let central_directory_offset = out.len() as u32;

        for entry in &self.entries {
            let crc = crc32fast::hash(&entry.data);
            let external_attrs: u32 = if entry.is_directory { 0x10 } else { 0 };

            out.extend_from_slice(&0x0201_4B50u32.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes()); // version made by
            out.extend_from_slice(&20u16.to_le_bytes()); // version needed
            out.extend_from_slice(&0u16.to_le_bytes()); // flags
            out.extend_from_slice(&0u16.to_le_bytes()); // method
            out.extend_from_slice(&0u16.to_le_bytes()); // mod time
            out.extend_from_slice(&0u16.to_le_bytes()); // mod date
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(entry.path.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes()); // extra field length
            out.extend_from_slice(&0u16.to_le_bytes()); // comment length
            out.extend_from_slice(&0u16.to_le_bytes()); // disk number start
            out.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
            out.extend_from_slice(&external_attrs.to_le_bytes());
            out.extend_from_slice(&entry.local_header_offset.to_le_bytes());
            out.extend_from_slice(entry.path.as_bytes());
        }

        let central_directory_size = out.len() as u32 - central_directory_offset;

        out.extend_from_slice(&0x0605_4B50u32.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // this disk
        out.extend_from_slice(&0u16.to_le_bytes()); // disk with cd
        out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&central_directory_size.to_le_bytes());
        out.extend_from_slice(&central_directory_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // comment length

        out
    }
}

fn well_formed_archive(message_xml: &[u8]) -> ZipBuilder {
    let mut builder = ZipBuilder::new();
    builder
        .add_dir("Accounts/")
        .add_dir("Local/")
        .add_file("Categories.xml", b"<categories/>")
        .add_file(
            "Local/com.microsoft.__Messages/0/__message_attachment__1.xml",
            message_xml,
        )
        .add_file(
            "Local/com.microsoft.__Messages/0/com.microsoft.__Attachments/1/report.pdf_0",
            b"%PDF-1.4 fake attachment bytes",
        );
    builder
}

fn write_archive(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(bytes).unwrap();
    tmp.flush().unwrap();
    tmp
}

const MINIMAL_MESSAGE_XML: &str = r#"<?xml version="1.0"?>
<messages>
  <OPFMessageCopySubject>Quarterly update</OPFMessageCopySubject>
  <OPFMessageCopyBody>See attached.</OPFMessageCopyBody>
  <OPFMessageCopySentTime>2015?06?07?08?09?10</OPFMessageCopySentTime>
  <OPFMessageCopyMessageID>abc-123</OPFMessageCopyMessageID>
  <OPFMessageGetPriority>&#33;</OPFMessageGetPriority>
  <OPFMessageCopyToAddresses>
    <emailAddress OPFContactEmailAddressAddress="a@x"/>
    <emailAddress OPFContactEmailAddressAddress="b@y"/>
  </OPFMessageCopyToAddresses>
  <OPFMessageCopySenderAddress>
    <emailAddress OPFContactEmailAddressAddress="sender@x"/>
  </OPFMessageCopySenderAddress>
  <OPFMessageCopyAttachmentList>
    <messageAttachment
        OPFAttachmentName="report.pdf"
        OPFAttachmentContentExtension="pdf"
        OPFAttachmentContentType="application/pdf"
        OPFAttachmentContentFileSize="31"
        OPFAttachmentURL="Local/com.microsoft.__Messages/0/com.microsoft.__Attachments/1/report.pdf_0"/>
  </OPFMessageCopyAttachmentList>
</messages>"#;

#[test]
fn opens_a_well_formed_archive_and_counts_entries() {
    let bytes = well_formed_archive(MINIMAL_MESSAGE_XML.as_bytes()).build();
    let file = write_archive(&bytes);

    let archive = OlmArchive::open(file.path(), OlmOptions::empty()).unwrap();
    assert_eq!(archive.message_count(), 1);
    assert_eq!(archive.attachment_entries().len(), 1);
}

#[test]
fn rejects_an_archive_missing_categories_xml() {
    let mut builder = ZipBuilder::new();
    builder.add_dir("Accounts/").add_dir("Local/");
    let bytes = builder.build();
    let file = write_archive(&bytes);

    let err = OlmArchive::open(file.path(), OlmOptions::empty()).unwrap_err();
    assert!(matches!(err, OlmError::NotOlmFile(_)));
}

#[test]
fn parses_addresses_subject_and_timestamp() {
    let bytes = well_formed_archive(MINIMAL_MESSAGE_XML.as_bytes()).build();
    let file = write_archive(&bytes);

    let mut archive = OlmArchive::open(file.path(), OlmOptions::empty()).unwrap();
    let message = archive.get_message_at(0).unwrap();

    assert_eq!(message.to, "a@x,b@y");
    assert_eq!(message.from, "sender@x");
    assert_eq!(message.subject, "Quarterly update");
    assert_eq!(message.body, "See attached.");
    assert_eq!(message.message_id, "abc-123");
    assert_eq!(message.attachments.len(), 1);

    let sent = message.sent_time.unwrap();
    assert_eq!(sent.format("%Y-%m-%d %H:%M:%S").to_string(), "2015-06-07 08:09:10");
}

#[test]
fn invalid_message_index_is_rejected() {
    let bytes = well_formed_archive(MINIMAL_MESSAGE_XML.as_bytes()).build();
    let file = write_archive(&bytes);

    let mut archive = OlmArchive::open(file.path(), OlmOptions::empty()).unwrap();
    let err = archive.get_message_at(5).unwrap_err();
    assert!(matches!(err, OlmError::InvalidParameter(_)));
}

#[test]
fn extracts_an_attachment_byte_identical_to_source() {
    let bytes = well_formed_archive(MINIMAL_MESSAGE_XML.as_bytes()).build();
    let file = write_archive(&bytes);

    let mut archive = OlmArchive::open(file.path(), OlmOptions::empty()).unwrap();
    let message = archive.get_message_at(0).unwrap();
    let attachment = &message.attachments[0];

    let dest_dir = tempfile::tempdir().unwrap();
    let dest_path = dest_dir.path().join("report.pdf");
    archive.extract_attachment(attachment, &dest_path).unwrap();

    let written = std::fs::read(&dest_path).unwrap();
    assert_eq!(written, b"%PDF-1.4 fake attachment bytes");
}

#[test]
fn message_with_bad_crc_is_reported_as_corrupted() {
    let mut builder = ZipBuilder::new();
    builder
        .add_dir("Accounts/")
        .add_dir("Local/")
        .add_file("Categories.xml", b"<categories/>")
        .add_file(
            "Local/com.microsoft.__Messages/0/__message_attachment__1.xml",
            MINIMAL_MESSAGE_XML.as_bytes(),
        );
    let mut bytes = builder.build();

    // Flip a byte inside the message payload without touching its recorded
    // CRC, which lives in both the local header and the central directory.
    let marker = b"Quarterly";
    let pos = bytes.windows(marker.len()).position(|w| w == marker).unwrap();
    bytes[pos] = b'X';

    let file = write_archive(&bytes);
    let mut archive = OlmArchive::open(file.path(), OlmOptions::empty()).unwrap();
    let err = archive.get_message_at(0).unwrap_err();
    assert!(matches!(err, OlmError::MessageCorrupted(_)));
}

#[test]
fn missing_attachment_entry_is_reported() {
    let bytes = well_formed_archive(MINIMAL_MESSAGE_XML.as_bytes()).build();
    let file = write_archive(&bytes);
    let mut archive = OlmArchive::open(file.path(), OlmOptions::empty()).unwrap();

    let phantom = olm_archive::Attachment {
        filename: "ghost.pdf".to_string(),
        extension: "pdf".to_string(),
        content_type: "application/pdf".to_string(),
        file_size: 0,
        private_key: "does/not/exist".to_string(),
    };

    let dest_dir = tempfile::tempdir().unwrap();
    let err = archive
        .extract_attachment(&phantom, &dest_dir.path().join("out.pdf"))
        .unwrap_err();
    assert!(matches!(err, OlmError::AttachmentNotFound));
}
