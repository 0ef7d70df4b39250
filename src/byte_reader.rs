//! Bounded little-endian reads over a seekable positional file.
//!
//! Everything in a ZIP archive (and by extension an OLM file) is
//! little-endian, and most of what this crate does is "seek somewhere, read
//! a fixed-width field, repeat." This is the one place that knows how to do
//! that; [`crate::central_directory`], [`crate::message`], and
//! [`crate::attachment`] just call into it.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use crate::result::OlmResult;

/// A positional reader over the archive's backing file.
///
/// Every read advances the file's cursor; callers that need to jump around
/// (the central directory lives at the end of the file, local headers are
/// scattered throughout it) do so with [`ByteReader::seek_from_start`] and
/// [`ByteReader::seek_from_end`] before reading.
#[derive(Debug)]
pub struct ByteReader {
    file: File,
}

impl ByteReader {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    pub fn len(&self) -> io::Result<u64> {
        self.file.metadata().map(|m| m.len())
    }

    pub fn seek_from_start(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Seeks to `offset` bytes before the end of the file. `offset` is
    /// given as a positive count back from EOF, matching the "22 bytes from
    /// the end" phrasing used throughout the ZIP spec.
    pub fn seek_from_end(&mut self, offset: i64) -> io::Result<()> {
        self.file.seek(SeekFrom::End(-offset))?;
        Ok(())
    }

    pub fn seek_relative(&mut self, offset: i64) -> io::Result<()> {
        self.file.seek(SeekFrom::Current(offset))?;
        Ok(())
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    /// Reads exactly `len` bytes from the current position.
    pub fn read_bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads exactly `buf.len()` bytes into `buf`. Used by the attachment
    /// extractor, which wants a reusable buffer rather than a fresh `Vec`
    /// per block.
    pub fn read_exact_into(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact(buf)
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        let mut buf = [0u8; 2];
        self.file.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.file.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        self.file.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads the last `len` bytes of the file into memory, for the
    /// end-of-central-directory search window. `len` is clamped to the
    /// file's actual size.
    pub fn read_tail(&mut self, len: u64) -> OlmResult<Vec<u8>> {
        let file_len = self.len()?;
        let window = len.min(file_len);
        self.seek_from_end(window as i64)?;
        Ok(self.read_bytes(window as usize)?)
    }
}

/// Reads a little-endian `u16` from the front of `input`, shrinking it.
///
/// Used when parsing a chunk that's already been read into memory (the
/// central directory's variable-length filename/extra-field/comment run, or
/// the EOCD search window), where re-entering [`ByteReader`] one field at a
/// time would mean needless seeks.
pub fn take_u16(input: &mut &[u8]) -> u16 {
    let (bytes, rest) = input.split_at(2);
    *input = rest;
    u16::from_le_bytes(bytes.try_into().unwrap())
}

pub fn take_u32(input: &mut &[u8]) -> u32 {
    let (bytes, rest) = input.split_at(4);
    *input = rest;
    u32::from_le_bytes(bytes.try_into().unwrap())
}

pub fn take_u64(input: &mut &[u8]) -> u64 {
    let (bytes, rest) = input.split_at(8);
    *input = rest;
    u64::from_le_bytes(bytes.try_into().unwrap())
}

pub fn take_bytes<'a>(input: &mut &'a [u8], len: usize) -> &'a [u8] {
    let (bytes, rest) = input.split_at(len);
    *input = rest;
    bytes
}
