//! Central-directory parsing: locating the EOCD, the optional ZIP64 locator
//! and EOCD, and walking the central directory itself.
//!
//! Field layouts and signatures are taken from the ZIP spec (APPNOTE.TXT),
//! the same source the teacher crate credits, cross-checked against the
//! packed C structs in `private.h` (`eocd_record32`, `eocdr_locator64`,
//! `eocd_record64`, `central_dir_entry_header`). Unlike the teacher, which
//! parses these out of an in-memory mapping with `&mut &[u8]`, everything
//! here reads through a [`ByteReader`] over a real file, because a message
//! or attachment lookup needs to seek back into the file long after the
//! central directory has been consumed.

use memchr::memmem;

use crate::byte_reader::{take_bytes, take_u16, take_u32, take_u64, ByteReader};
use crate::result::{OlmError, OlmResult};

/// End of central directory record signature.
const EOCDR_SIGNATURE: u32 = 0x0605_4B50;
/// ZIP64 end of central directory record signature.
const ZIP64_EOCDR_SIGNATURE: u32 = 0x0606_4B50;
/// ZIP64 end of central directory locator signature.
const ZIP64_EOCDR_LOCATOR_SIGNATURE: u32 = 0x0706_4B50;
/// Central directory file header signature.
const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0201_4B50;
/// Local file header signature.
pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x0403_4B50;

/// A fixed-width record plus its variable-length comment, minus the comment:
/// 22 bytes is `EndOfCentralDirectory`'s on-disk size.
const EOCDR_FIXED_SIZE: u64 = 22;
/// Maximum ZIP comment length (a `u16`) plus the fixed record size: how far
/// back from EOF the EOCDR search is allowed to go before giving up.
const EOCDR_SEARCH_WINDOW: u64 = 65_535 + EOCDR_FIXED_SIZE + 1;
const ZIP64_LOCATOR_SIZE: u64 = 20;

#[derive(Debug)]
pub struct EndOfCentralDirectory {
    pub this_disk: u16,
    pub disk_with_central_directory: u16,
    pub entries_on_this_disk: u16,
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub comment: Vec<u8>,
}

/// Searches the tail of the file for the EOCD record.
///
/// The signature should be 22 bytes from EOF if the archive has no comment;
/// with a comment present it's further back, so we search backward one byte
/// at a time (per spec.md §4.1) bounded at 65,558 bytes before EOF. We
/// implement that bounded backward search as a single `rfind` over the
/// candidate window, which finds the same (rightmost) match the byte-by-byte
/// walk would.
pub fn find_and_parse_eocd(reader: &mut ByteReader) -> OlmResult<EndOfCentralDirectory> {
    let window = reader.read_tail(EOCDR_SEARCH_WINDOW)?;
    let mut sig_bytes = [0u8; 4];
    sig_bytes.copy_from_slice(&EOCDR_SIGNATURE.to_le_bytes());
    let posit = memmem::rfind(&window, &sig_bytes)
        .ok_or(OlmError::NotOlmFile("couldn't find end of central directory record"))?;

    if window.len() - posit < EOCDR_FIXED_SIZE as usize {
        return Err(OlmError::NotOlmFile(
            "end of central directory record runs past end of file",
        ));
    }

    let mut record = &window[posit..];
    let signature = take_u32(&mut record);
    debug_assert_eq!(signature, EOCDR_SIGNATURE);
    let this_disk = take_u16(&mut record);
    let disk_with_central_directory = take_u16(&mut record);
    let entries_on_this_disk = take_u16(&mut record);
    let entries = take_u16(&mut record);
    let central_directory_size = take_u32(&mut record);
    let central_directory_offset = take_u32(&mut record);
    let comment_length = take_u16(&mut record) as usize;

    let comment = if comment_length > 0 && record.len() >= comment_length {
        take_bytes(&mut record, comment_length).to_vec()
    } else {
        Vec::new()
    };

    Ok(EndOfCentralDirectory {
        this_disk,
        disk_with_central_directory,
        entries_on_this_disk,
        entries,
        central_directory_size,
        central_directory_offset,
        comment,
    })
}

#[derive(Debug)]
pub struct Zip64Locator {
    pub disk_with_central_directory: u32,
    pub zip64_eocdr_offset: u64,
    pub total_disks: u32,
}

/// Reads the 20 bytes immediately before the EOCDR and, if they carry the
/// ZIP64 locator signature, parses them. Returns `Ok(None)` (not an error)
/// when the bytes there don't match: that just means this isn't a ZIP64
/// archive.
pub fn try_parse_zip64_locator(
    reader: &mut ByteReader,
    eocdr_absolute_offset: u64,
) -> OlmResult<Option<Zip64Locator>> {
    let locator_offset = eocdr_absolute_offset
        .checked_sub(ZIP64_LOCATOR_SIZE)
        .ok_or(OlmError::NotOlmFile("too small for a ZIP64 locator"))?;
    reader.seek_from_start(locator_offset)?;
    let bytes = reader.read_bytes(ZIP64_LOCATOR_SIZE as usize)?;
    let mut field = bytes.as_slice();

    let signature = take_u32(&mut field);
    if signature != ZIP64_EOCDR_LOCATOR_SIGNATURE {
        return Ok(None);
    }
    let disk_with_central_directory = take_u32(&mut field);
    let zip64_eocdr_offset = take_u64(&mut field);
    let total_disks = take_u32(&mut field);

    Ok(Some(Zip64Locator {
        disk_with_central_directory,
        zip64_eocdr_offset,
        total_disks,
    }))
}

#[derive(Debug)]
pub struct Zip64EndOfCentralDirectory {
    pub entries: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
}

pub fn parse_zip64_eocd(
    reader: &mut ByteReader,
    absolute_offset: u64,
) -> OlmResult<Zip64EndOfCentralDirectory> {
    reader.seek_from_start(absolute_offset)?;
    // Fixed-size fields only; we don't care about the version/disk fields or
    // the variable-length extensible data sector that can follow them.
    let bytes = reader.read_bytes(56)?;
    let mut record = bytes.as_slice();

    let signature = take_u32(&mut record);
    if signature != ZIP64_EOCDR_SIGNATURE {
        return Err(OlmError::FileCorrupted(
            "ZIP64 locator pointed at something that isn't a ZIP64 end of central directory record",
        ));
    }
    let _record_size = take_u64(&mut record);
    let _version_made_by = take_u16(&mut record);
    let _version_needed = take_u16(&mut record);
    let _this_disk = take_u32(&mut record);
    let _disk_with_central_directory = take_u32(&mut record);
    let _entries_on_this_disk = take_u64(&mut record);
    let entries = take_u64(&mut record);
    let central_directory_size = take_u64(&mut record);
    let central_directory_offset = take_u64(&mut record);

    Ok(Zip64EndOfCentralDirectory {
        entries,
        central_directory_size,
        central_directory_offset,
    })
}

/// A raw central-directory record, before path splitting or classification.
#[derive(Debug)]
pub struct RawCentralDirectoryEntry {
    pub path: String,
    pub compression_method: u16,
    pub crc32: u32,
    pub flags: u16,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub external_file_attributes: u32,
    pub local_header_offset: u64,
}

/// FAT/DOS directory attribute bit (`FAT_ATTRIB_DIR` in `private.h`).
const FAT_ATTRIB_DIR: u32 = 0x10;

impl RawCentralDirectoryEntry {
    pub fn is_directory(&self) -> bool {
        self.path.ends_with('/') || (self.external_file_attributes & FAT_ATTRIB_DIR) != 0
    }
}

/// Reads and parses the next central-directory record from `reader`, which
/// must already be positioned at its start.
pub fn read_next_entry(reader: &mut ByteReader) -> OlmResult<RawCentralDirectoryEntry> {
    let fixed = reader.read_bytes(46)?;
    let mut header = fixed.as_slice();

    let signature = take_u32(&mut header);
    if signature != CENTRAL_DIRECTORY_SIGNATURE {
        return Err(OlmError::FileCorrupted(
            "central directory entry has the wrong signature",
        ));
    }
    let _version_made_by = take_u16(&mut header);
    let _version_needed = take_u16(&mut header);
    let flags = take_u16(&mut header);
    let compression_method = take_u16(&mut header);
    let _last_modified_time = take_u16(&mut header);
    let _last_modified_date = take_u16(&mut header);
    let crc32 = take_u32(&mut header);
    let mut compressed_size = take_u32(&mut header) as u64;
    let mut uncompressed_size = take_u32(&mut header) as u64;
    let path_length = take_u16(&mut header) as usize;
    let extra_field_length = take_u16(&mut header) as usize;
    let file_comment_length = take_u16(&mut header) as usize;
    let _disk_number = take_u16(&mut header);
    let _internal_file_attributes = take_u16(&mut header);
    let external_file_attributes = take_u32(&mut header);
    let mut local_header_offset = take_u32(&mut header) as u64;

    if path_length == 0 {
        return Err(OlmError::FileCorrupted(
            "central directory entry has an empty path",
        ));
    }

    let path_bytes = reader.read_bytes(path_length)?;
    let path = String::from_utf8(path_bytes)
        .map_err(|_| OlmError::FileCorrupted("entry path is not valid UTF-8"))?;

    let extra_field = reader.read_bytes(extra_field_length)?;
    apply_zip64_overrides(
        &extra_field,
        &mut uncompressed_size,
        &mut compressed_size,
        &mut local_header_offset,
    )?;

    if file_comment_length > 0 {
        reader.seek_relative(file_comment_length as i64)?;
    }

    Ok(RawCentralDirectoryEntry {
        path,
        compression_method,
        crc32,
        flags,
        uncompressed_size,
        compressed_size,
        external_file_attributes,
        local_header_offset,
    })
}

/// ZIP64 extra field tag (`0x0001`).
const ZIP64_EXTRA_FIELD_TAG: u16 = 0x0001;
const SENTINEL_32: u32 = 0xFFFF_FFFF;

/// Applies ZIP64 extra-field overrides per spec.md §4.1: a 32-bit field
/// equal to the sentinel `0xFFFFFFFF` gets its real value from the next 8
/// bytes of the ZIP64 extra field's payload, in the fixed order
/// (uncompressed size, compressed size, local header offset). Fields not at
/// the sentinel are left untouched, and the corresponding 8-byte slot in the
/// extra field's payload is skipped, not consumed.
fn apply_zip64_overrides(
    extra_field: &[u8],
    uncompressed_size: &mut u64,
    compressed_size: &mut u64,
    local_header_offset: &mut u64,
) -> OlmResult<()> {
    let mut cursor = extra_field;
    while cursor.len() >= 4 {
        let tag = take_u16(&mut cursor);
        let size = take_u16(&mut cursor) as usize;
        if size > cursor.len() {
            return Err(OlmError::FileCorrupted("extra field runs past its record"));
        }
        let (mut data, rest) = cursor.split_at(size);
        cursor = rest;

        if tag == ZIP64_EXTRA_FIELD_TAG {
            if *uncompressed_size == SENTINEL_32 as u64 && data.len() >= 8 {
                *uncompressed_size = take_u64(&mut data);
            }
            if *compressed_size == SENTINEL_32 as u64 && data.len() >= 8 {
                *compressed_size = take_u64(&mut data);
            }
            if *local_header_offset == SENTINEL_32 as u64 && data.len() >= 8 {
                *local_header_offset = take_u64(&mut data);
            }
        }
    }
    Ok(())
}
