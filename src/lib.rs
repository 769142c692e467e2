// Copyright (C) 2023 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Demuxer for the FLV container format.
//!
//! [`Demuxer`] splits an FLV byte stream into tags and re-frames the codec
//! payloads as raw elementary streams: H.264 video as Annex B NAL units
//! (`00 00 00 01`-prefixed) and AAC audio as ADTS frames. Script data
//! (`onMetaData`) tags are decoded into [`script::ScriptValue`]s and logged.
//!
//! See the following references:
//! *   [Adobe Flash Video File Format Specification v10.1](https://rtmp.veriskope.com/pdf/video_file_format_spec_v10_1.pdf):
//!     the FLV header, tag, `AUDIODATA`, `VIDEODATA`, and `SCRIPTDATA`
//!     layouts.
//! *   ISO/IEC 14496-3: Audio — AudioSpecificConfig and ADTS framing.
//! *   ISO/IEC 14496-15: the `AVCDecoderConfigurationRecord`.
//!
//! The demuxer is synchronous and resumable. Feed it any prefix of the
//! stream; it consumes as many complete units as the buffer permits and
//! returns the unconsumed remainder, which the caller should extend with
//! further input before calling again. Unexpected byte patterns abort the
//! session with an [`Error`]; there is no skip-and-resync.
//!
//! ```
//! use macula::{Demuxer, Sinks};
//!
//! // A stream header (audio + video present) followed by PreviousTagSize0.
//! let stream: &[u8] = b"FLV\x01\x05\x00\x00\x00\x09\x00\x00\x00\x00";
//! let (mut video, mut audio) = (Vec::<u8>::new(), Vec::<u8>::new());
//! let mut demuxer = Demuxer::new();
//! let rest = demuxer
//!     .advance(
//!         stream,
//!         &mut Sinks {
//!             video: &mut video,
//!             audio: &mut audio,
//!         },
//!     )
//!     .unwrap();
//! assert!(rest.is_empty());
//! ```

#![forbid(clippy::print_stderr, clippy::print_stdout)]

mod error;

/// Wraps the supplied `ErrorInt` and returns it as an `Err`.
macro_rules! bail {
    ($e:expr) => {
        return Err(crate::error::Error(std::sync::Arc::new($e)))
    };
}

macro_rules! wrap {
    ($e:expr) => {
        crate::error::Error(std::sync::Arc::new($e))
    };
}

pub(crate) mod codec;
mod demux;
mod hex;
mod reader;
pub mod script;

#[cfg(test)]
mod testutil;

pub use codec::Sinks;
pub use demux::Demuxer;
pub use error::{Error, ErrorKind};

/// Position of the unit being parsed: which tag (if any) and the stream
/// byte offset at which that unit starts.
///
/// Attached to errors and log lines so an offending tag can be found again
/// in a hex editor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct TagContext {
    /// Index of the tag, starting from 1. `None` while parsing the stream
    /// header or a `PreviousTagSize` record.
    tag: Option<u64>,

    /// Byte offset of the unit's first byte within the overall stream.
    offset: u64,
}

impl std::fmt::Display for TagContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.tag {
            Some(i) => write!(f, "tag {} @ {:#x}", i, self.offset),
            None => write!(f, "offset {:#x}", self.offset),
        }
    }
}

#[cfg(test)]
impl TagContext {
    pub(crate) fn dummy() -> Self {
        TagContext {
            tag: None,
            offset: 0,
        }
    }
}
