//! Message retrieval: re-reading a message's XML body from the archive,
//! validating it, and parsing it into a [`MailMessage`].
//!
//! Grounded on `olm_get_message_at` and `parse_element_names` in the
//! original C implementation. The XML walk keeps the original's
//! parent-context matching (an `emailAddress` element means something
//! different depending on whether its parent is
//! `OPFMessageCopyToAddresses`, `...ReplyToAddresses`, or
//! `...SenderAddress`) but uses `roxmltree`'s borrowed DOM instead of
//! manually walking `xmlNode` pointers.

use chrono::{DateTime, Local, TimeZone};
use roxmltree::{Document, Node, ParsingOptions};

use crate::byte_reader::ByteReader;
use crate::catalog::ArchiveEntry;
use crate::central_directory::LOCAL_FILE_HEADER_SIGNATURE;
use crate::result::{OlmError, OlmResult};

const NO_ADDRESS: &str = "NO_ADDRESS";
const NO_SUBJECT: &str = "NO_SUBJECT";
const NO_MESSAGE_ID: &str = "NO_MESSAGE_ID";
const NO_BODY: &str = "NO_BODY";

/// ZIP "stored" (no compression) method. OLM never compresses message or
/// attachment payloads; anything else means the archive has been tampered
/// with or mis-generated.
const COMPRESSION_STORED: u16 = 0;

pub const MESSAGE_PRIORITY_HIGHEST: i32 = 1;
pub const MESSAGE_PRIORITY_HIGH: i32 = 2;
pub const MESSAGE_PRIORITY_NORMAL: i32 = 3;
pub const MESSAGE_PRIORITY_LOW: i32 = 4;
pub const MESSAGE_PRIORITY_LOWEST: i32 = 5;

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub extension: String,
    pub content_type: String,
    pub file_size: u64,
    /// The attachment entry's archive path, used to look the attachment up
    /// again when the caller asks to extract it. Opaque to callers beyond
    /// that: don't parse it for meaning.
    pub private_key: String,
}

#[derive(Debug, Clone)]
pub struct MailMessage {
    pub to: String,
    pub from: String,
    pub reply_to: String,
    pub subject: String,
    pub message_id: String,
    pub body: String,
    pub sent_time: Option<DateTime<Local>>,
    pub received_time: Option<DateTime<Local>>,
    pub modified_time: Option<DateTime<Local>>,
    pub has_html: bool,
    pub has_rich_text: bool,
    pub message_priority: i32,
    pub attachments: Vec<Attachment>,
}

impl Default for MailMessage {
    fn default() -> Self {
        Self {
            to: String::new(),
            from: String::new(),
            reply_to: String::new(),
            subject: String::new(),
            message_id: String::new(),
            body: String::new(),
            sent_time: None,
            received_time: None,
            modified_time: None,
            has_html: false,
            has_rich_text: false,
            message_priority: MESSAGE_PRIORITY_NORMAL,
            attachments: Vec::new(),
        }
    }
}

/// Reads and parses the message at `entry`, skipping its local file header
/// and validating its CRC-32 before handing the bytes to the XML parser.
///
/// `ignore_errors` mirrors `OLM_OPT_IGNORE_ERRORS`: when set, malformed XML
/// is recovered from on a best-effort basis instead of failing the call.
pub fn read_message(
    reader: &mut ByteReader,
    entry: &ArchiveEntry,
    ignore_errors: bool,
) -> OlmResult<MailMessage> {
    if entry.compression_method != COMPRESSION_STORED {
        return Err(OlmError::MessageCorrupted(
            "message entry uses compression, which OLM archives never do",
        ));
    }

    let xml_bytes = read_entry_payload(reader, entry, "message")?;

    let xml_text = std::str::from_utf8(&xml_bytes)
        .map_err(|_| OlmError::MessageCorrupted("message body is not valid UTF-8"))?;

    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = match Document::parse_with_options(xml_text, options) {
        Ok(doc) => doc,
        Err(_) if ignore_errors => return Ok(fill_placeholders(MailMessage::default())),
        Err(_) => return Err(OlmError::MessageCorrupted("message body is not valid XML")),
    };

    let mut message = MailMessage::default();
    walk(doc.root(), &mut message);
    Ok(fill_placeholders(message))
}

/// Reads a message or attachment's raw payload: seeks to its local file
/// header, skips it (re-reading the header to make sure it's really there,
/// per spec.md's strict-local-header check), then reads `entry`'s declared
/// size and validates it against the stored CRC-32.
pub(crate) fn read_entry_payload(
    reader: &mut ByteReader,
    entry: &ArchiveEntry,
    kind: &'static str,
) -> OlmResult<Vec<u8>> {
    reader.seek_from_start(entry.local_header_offset)?;

    let signature = reader.read_u32()?;
    #[cfg(feature = "strict-local-header")]
    if signature != LOCAL_FILE_HEADER_SIGNATURE {
        return Err(OlmError::FileCorrupted(
            "local file header has the wrong signature",
        ));
    }
    #[cfg(not(feature = "strict-local-header"))]
    let _ = signature;
    // Skip version/flags/method/time/date/crc/sizes: 22 bytes.
    reader.seek_relative(22)?;
    let filename_len = reader.read_u16()? as i64;
    let extra_len = reader.read_u16()? as i64;
    reader.seek_relative(filename_len + extra_len)?;

    let data = reader.read_bytes(entry.uncompressed_size as usize)?;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data);
    if hasher.finalize() != entry.crc32 {
        return Err(match kind {
            "attachment" => OlmError::AttachmentCorrupted("CRC-32 mismatch"),
            _ => OlmError::MessageCorrupted("CRC-32 mismatch"),
        });
    }

    Ok(data)
}

fn fill_placeholders(mut message: MailMessage) -> MailMessage {
    if message.to.is_empty() {
        message.to = NO_ADDRESS.to_string();
    }
    if message.from.is_empty() {
        message.from = NO_ADDRESS.to_string();
    }
    if message.reply_to.is_empty() {
        message.reply_to = NO_ADDRESS.to_string();
    }
    if message.subject.is_empty() {
        message.subject = NO_SUBJECT.to_string();
    }
    if message.message_id.is_empty() {
        message.message_id = NO_MESSAGE_ID.to_string();
    }
    if message.body.is_empty() {
        message.body = NO_BODY.to_string();
    }
    message
}

/// Walks the document tree depth-first, looking at each element's name and
/// (for `emailAddress`) its parent's name, the same way the original's
/// `cur_node->parent->name` checks do.
fn walk(node: Node, message: &mut MailMessage) {
    for child in node.children() {
        if !child.is_element() {
            continue;
        }
        let name = child.tag_name().name();

        match name {
            "emailAddress" => handle_email_address(child, message),
            "OPFMessageCopySubject" => {
                if let Some(text) = child.text() {
                    message.subject = text.to_string();
                }
            }
            "OPFMessageCopyBody" => {
                if let Some(text) = child.text() {
                    message.body = text.to_string();
                }
            }
            "OPFMessageCopySentTime" => {
                message.sent_time = child.text().and_then(parse_olm_timestamp);
            }
            "OPFMessageCopyReceivedTime" => {
                message.received_time = child.text().and_then(parse_olm_timestamp);
            }
            "OPFMessageCopyModDate" => {
                message.modified_time = child.text().and_then(parse_olm_timestamp);
            }
            "OPFMessageCopyMessageID" => {
                if let Some(text) = child.text() {
                    message.message_id = text.to_string();
                }
            }
            "OPFMessageGetHasHTML" => {
                message.has_html = child.text().is_some_and(|t| !t.starts_with('0'));
            }
            "OPFMessageGetHasRichText" => {
                message.has_rich_text = child.text().is_some_and(|t| !t.starts_with('0'));
            }
            "OPFMessageGetPriority" => {
                if let Some(text) = child.text() {
                    message.message_priority = parse_priority(text);
                }
            }
            "messageAttachment" => {
                message.attachments.push(parse_attachment(child));
            }
            _ => {}
        }

        walk(child, message);
    }
}

fn handle_email_address(node: Node, message: &mut MailMessage) {
    let Some(parent) = node.parent_element() else {
        return;
    };
    let Some(address) = node
        .attribute("OPFContactEmailAddressAddress")
        .filter(|s| !s.is_empty())
    else {
        return;
    };

    match parent.tag_name().name() {
        "OPFMessageCopyToAddresses" => {
            if message.to.is_empty() {
                message.to.push_str(address);
            } else {
                message.to.push(',');
                message.to.push_str(address);
            }
        }
        "OPFMessageCopyReplyToAddresses" => {
            if message.reply_to.is_empty() {
                message.reply_to.push_str(address);
            } else {
                message.reply_to.push(',');
                message.reply_to.push_str(address);
            }
        }
        "OPFMessageCopySenderAddress" => {
            message.from = address.to_string();
        }
        _ => {}
    }
}

fn parse_attachment(node: Node) -> Attachment {
    Attachment {
        filename: node.attribute("OPFAttachmentName").unwrap_or("").to_string(),
        extension: node
            .attribute("OPFAttachmentContentExtension")
            .unwrap_or("")
            .to_string(),
        content_type: node
            .attribute("OPFAttachmentContentType")
            .unwrap_or("")
            .to_string(),
        file_size: node
            .attribute("OPFAttachmentContentFileSize")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        private_key: node.attribute("OPFAttachmentURL").unwrap_or("").to_string(),
    }
}

/// The first byte of `OPFMessageGetPriority`'s text is an ASCII digit
/// offset by `'0' + 3`; anything outside the valid priority range falls
/// back to normal, same as the original's `-= 30` and range check.
fn parse_priority(text: &str) -> i32 {
    let Some(byte) = text.bytes().next() else {
        return MESSAGE_PRIORITY_NORMAL;
    };
    let priority = byte as i32 - 30;
    if (MESSAGE_PRIORITY_HIGHEST..=MESSAGE_PRIORITY_LOWEST).contains(&priority) {
        priority
    } else {
        MESSAGE_PRIORITY_NORMAL
    }
}

/// Parses OLM's `YYYY?MM?DD?HH?MM?SS` timestamp format, where `?` is any
/// single non-digit separator (the original reads it with
/// `"%d%*c%d%*c%d%*c%d%*c%d%*c%d"`, which skips exactly one non-digit byte
/// between each number). The result is interpreted as local time, with DST
/// resolved the way `mktime` does it: ambiguous or nonexistent local times
/// fall back to the earliest valid interpretation.
fn parse_olm_timestamp(text: &str) -> Option<DateTime<Local>> {
    let mut parts = Vec::with_capacity(6);
    let mut digits = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !digits.is_empty() {
            parts.push(digits.clone());
            digits.clear();
        }
        if parts.len() == 6 {
            break;
        }
    }
    if parts.len() < 6 && !digits.is_empty() {
        parts.push(digits);
    }
    if parts.len() != 6 {
        return None;
    }

    let year: i32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let day: u32 = parts[2].parse().ok()?;
    let hour: u32 = parts[3].parse().ok()?;
    let minute: u32 = parts[4].parse().ok()?;
    let second: u32 = parts[5].parse().ok()?;

    match Local.with_ymd_and_hms(year, month, day, hour, minute, second) {
        chrono::LocalResult::Single(dt) => Some(dt),
        chrono::LocalResult::Ambiguous(earliest, _) => Some(earliest),
        chrono::LocalResult::None => None,
    }
}
