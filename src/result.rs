//! Error types and the related `Result<T>`.
//!
//! Mirrors the error taxonomy of the original C library (`OLM_ERROR_*` in
//! `libolmec.h`) as a `thiserror` enum instead of an integer out-parameter.

use thiserror::Error;

pub type OlmResult<T> = Result<T, OlmError>;

#[derive(Debug, Error)]
pub enum OlmError {
    /// An error from underlying I/O.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// A caller-supplied argument was invalid (e.g. a message index past
    /// the end of the catalog). The original library used `NO_MEMORY` for
    /// this case; spec.md calls that out as a known bug (see DESIGN.md).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// The archive doesn't carry the magic entries (`Accounts/`, `Local/`,
    /// `Categories.xml`) that identify it as an OLM file, or its ZIP framing
    /// couldn't be located at all.
    #[error("Not an OLM file: {0}")]
    NotOlmFile(&'static str),

    /// The ZIP structure itself is malformed: a bad signature, an
    /// impossible length, a ZIP64 record that doesn't agree with its
    /// locator.
    #[error("Corrupted archive: {0}")]
    FileCorrupted(&'static str),

    /// An allocation failed. Rust's global allocator aborts the process on
    /// most such failures rather than returning an error, so this variant
    /// is reserved for the few paths (see DESIGN.md) where we can detect
    /// the condition before allocating and fail gracefully instead.
    #[error("Out of memory")]
    NoMemory,

    /// A message's stored bytes didn't pass CRC-32 validation, or its XML
    /// body could not be parsed.
    #[error("Corrupted message: {0}")]
    MessageCorrupted(&'static str),

    /// An attachment's stored bytes didn't pass CRC-32 validation, or it
    /// claims a compression method other than "stored".
    #[error("Corrupted attachment: {0}")]
    AttachmentCorrupted(&'static str),

    /// No attachment entry in the archive matches the given reference's
    /// private key.
    #[error("Attachment not found in archive")]
    AttachmentNotFound,
}
