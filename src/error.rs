// Copyright (C) 2023 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fmt::Display, sync::Arc};

use thiserror::Error;

use crate::TagContext;

/// An opaque `std::error::Error + Send + Sync + 'static` implementation.
///
/// The focus is on detailed human-readable messages; most carry enough
/// information to find the offending tag in a hex editor. Use
/// [`Error::kind`] to distinguish broad classes of failure, in particular
/// "this feature is out of scope" from "this stream is corrupt".
#[derive(Clone)]
pub struct Error(pub(crate) Arc<ErrorInt>);

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match *self.0 {
            ErrorInt::Truncated { .. } => ErrorKind::Truncated,
            ErrorInt::Structural { .. } => ErrorKind::Structural,
            ErrorInt::InvalidFieldValue { .. } => ErrorKind::InvalidFieldValue,
            ErrorInt::Unsupported { .. } => ErrorKind::Unsupported,
            ErrorInt::FailedPrecondition { .. } => ErrorKind::FailedPrecondition,
            ErrorInt::Write { .. } => ErrorKind::Write,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

impl std::error::Error for Error {}

/// Broad classification of an [`Error`].
///
/// Every kind is fatal to the session by design: the demuxer is
/// corruption-intolerant and never attempts skip-and-resync. All but
/// [`ErrorKind::Write`] describe the stream; `Write` indicates a failing
/// sink.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// A length field or fixed-size structure extends past the bytes that
    /// bound it (within a tag, the authoritative 24-bit payload size).
    Truncated,

    /// A fixed field didn't hold its required value: signature, version,
    /// reserved bits, stream id, object end marker.
    Structural,

    /// A value fell outside its closed enumeration.
    InvalidFieldValue,

    /// The stream uses a feature this crate rejects by design: encrypted
    /// tags, non-AVC video codecs, command frames, and several script
    /// value kinds.
    Unsupported,

    /// Tags arrived in an order the decoder can't satisfy, e.g. a raw AAC
    /// frame before the sequence header carrying its parameters.
    FailedPrecondition,

    /// Writing to an elementary-stream sink failed.
    Write,
}

#[derive(Debug, Error)]
pub(crate) enum ErrorInt {
    #[error("[{ctx}] truncated {what}: need {need} bytes, have {have}")]
    Truncated {
        ctx: TagContext,
        what: &'static str,
        need: usize,
        have: usize,
    },

    #[error("[{ctx}] {field} must be {expected}, got {got}")]
    Structural {
        ctx: TagContext,
        field: &'static str,
        expected: &'static str,
        got: String,
    },

    #[error("[{ctx}] invalid {field} {value}")]
    InvalidFieldValue {
        ctx: TagContext,
        field: &'static str,
        value: i64,
    },

    #[error("[{ctx}] unsupported {description}")]
    Unsupported { ctx: TagContext, description: String },

    #[error("[{ctx}] {description}")]
    FailedPrecondition { ctx: TagContext, description: String },

    #[error("[{ctx}] error writing to {sink} elementary stream: {source}")]
    Write {
        ctx: TagContext,
        sink: &'static str,
        #[source]
        source: std::io::Error,
    },
}
