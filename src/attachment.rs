//! Attachment extraction: finding an attachment's entry by its private key,
//! re-reading it from the archive, and writing it out to a destination file.
//!
//! Grounded on `olm_extract_and_save_attachment` in the original C
//! implementation, with two of its documented bugs fixed here:
//!
//! - The original returns `ATTACHMENT_CORRUPTED` on a CRC mismatch before
//!   reaching its own `unlink()` call, so the partially-written file is
//!   never removed. Here the bad file is deleted before the error is
//!   returned.
//! - The original's block-size search (`allocate_block_for_buffer`) tries
//!   successively larger block counts until it finds one that evenly
//!   divides the payload size, which is unbounded for a payload whose only
//!   divisors are 1 and itself. Here a fixed chunk size is used with a
//!   final short block, which always terminates and never allocates more
//!   than one chunk's worth of memory regardless of attachment size.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::byte_reader::ByteReader;
use crate::catalog::ArchiveEntry;
use crate::message::Attachment;
use crate::result::{OlmError, OlmResult};

/// ZIP "stored" method; OLM attachments are never compressed.
const COMPRESSION_STORED: u16 = 0;

/// Size of the copy buffer used to stream an attachment to disk. Chosen to
/// be large enough to avoid excessive syscalls on big attachments while
/// staying a modest, fixed allocation regardless of attachment size.
const COPY_CHUNK_SIZE: usize = 256 * 1024;

/// Extracts `attachment` from the archive and writes it to `dest_path`,
/// overwriting any existing file there.
pub fn extract_attachment(
    reader: &mut ByteReader,
    attachments: &[ArchiveEntry],
    attachment: &Attachment,
    dest_path: &Path,
) -> OlmResult<()> {
    let entry = attachments
        .iter()
        .find(|e| e.raw_path == attachment.private_key)
        .ok_or(OlmError::AttachmentNotFound)?;

    reader.seek_from_start(entry.local_header_offset)?;
    let signature = reader.read_u32()?;
    #[cfg(feature = "strict-local-header")]
    if signature != crate::central_directory::LOCAL_FILE_HEADER_SIGNATURE {
        return Err(OlmError::FileCorrupted(
            "local file header has the wrong signature",
        ));
    }
    #[cfg(not(feature = "strict-local-header"))]
    let _ = signature;
    reader.seek_relative(22)?;
    let filename_len = reader.read_u16()? as i64;
    let extra_len = reader.read_u16()? as i64;
    reader.seek_relative(filename_len + extra_len)?;

    if entry.compression_method != COMPRESSION_STORED {
        return Err(OlmError::AttachmentCorrupted(
            "attachment entry uses compression, which OLM archives never do",
        ));
    }

    let mut dest = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dest_path)?;

    let crc = match copy_payload(reader, &mut dest, entry.uncompressed_size) {
        Ok(crc) => crc,
        Err(err) => {
            drop(dest);
            let _ = fs::remove_file(dest_path);
            return Err(err);
        }
    };
    drop(dest);

    if crc != entry.crc32 {
        let _ = fs::remove_file(dest_path);
        return Err(OlmError::AttachmentCorrupted("CRC-32 mismatch"));
    }

    Ok(())
}

/// Streams exactly `total_len` bytes from `reader` to `dest` in fixed-size
/// chunks (with a final short chunk for the remainder), returning the
/// running CRC-32 of everything written.
fn copy_payload(reader: &mut ByteReader, dest: &mut File, total_len: u64) -> OlmResult<u32> {
    let mut hasher = crc32fast::Hasher::new();
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE.min(total_len.max(1) as usize)];
    let mut remaining = total_len;

    while remaining > 0 {
        let chunk_len = (buffer.len() as u64).min(remaining) as usize;
        let chunk = &mut buffer[..chunk_len];
        reader.read_exact_into(chunk)?;
        hasher.update(chunk);
        dest.write_all(chunk)?;
        remaining -= chunk_len as u64;
    }

    Ok(hasher.finalize())
}
