// Copyright (C) 2023 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Codec-specific logic for the audio and video tag payloads.
//!
//! Each sub-module owns one tag type's header byte(s) and the nested codec
//! structures behind them, and appends re-framed output to the matching
//! elementary-stream sink.

use std::io::Write;

use crate::error::ErrorInt;
use crate::{Error, TagContext};

pub(crate) mod aac;
pub(crate) mod h264;

/// Borrowed elementary-stream destinations for one [`crate::Demuxer::advance`]
/// call.
///
/// Constructed by the session owner and passed by reference; both sinks are
/// append-only and receive bytes in tag-arrival order. In-memory `Vec<u8>`
/// sinks work for tests; the command-line binary passes buffered files.
pub struct Sinks<'a> {
    /// Receives the Annex B video elementary stream: each NAL unit prefixed
    /// with `00 00 00 01`.
    pub video: &'a mut dyn Write,

    /// Receives the ADTS audio elementary stream: a 7-byte header followed
    /// by the raw AAC payload, per frame.
    pub audio: &'a mut dyn Write,
}

pub(crate) fn write_all(
    sink: &mut dyn Write,
    name: &'static str,
    ctx: TagContext,
    bytes: &[u8],
) -> Result<(), Error> {
    sink.write_all(bytes).map_err(|source| {
        wrap!(ErrorInt::Write {
            ctx,
            sink: name,
            source,
        })
    })
}
