// Copyright (C) 2023 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The tag-level state machine: stream header, `PreviousTagSize` records,
//! and generic tag headers, dispatching payloads to the codec and script
//! data parsers.

use log::{debug, trace};

use crate::codec::aac::{AacConfig, AacPacketType, SoundFormat, SoundRate, SoundSize, SoundType};
use crate::codec::h264::{AvcPacketType, CodecId, FrameType};
use crate::codec::{self, Sinks};
use crate::error::ErrorInt;
use crate::hex::LimitedHex;
use crate::reader::SliceReader;
use crate::script;
use crate::{Error, TagContext};

const STREAM_HEADER_LEN: usize = 9;
const PREVIOUS_TAG_SIZE_LEN: usize = 4;
const TAG_HEADER_LEN: usize = 11;

/// Which unit the demuxer expects next. Transitions are made only by
/// [`Demuxer::advance`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ParserState {
    AwaitingHeader,
    AwaitingPreviousTagSize,
    AwaitingTag,
}

/// The stream header's contents; validated, logged, and discarded.
struct StreamHeader {
    has_audio: bool,
    has_video: bool,
}

impl std::fmt::Debug for StreamHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHeader")
            .field("has_audio", &self.has_audio)
            .field("has_video", &self.has_video)
            .finish()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum TagType {
    Audio,
    Video,
    ScriptData,
}

impl TagType {
    fn parse(code: u8, ctx: TagContext) -> Result<Self, Error> {
        Ok(match code {
            8 => TagType::Audio,
            9 => TagType::Video,
            18 => TagType::ScriptData,
            _ => bail!(ErrorInt::InvalidFieldValue {
                ctx,
                field: "TagType",
                value: i64::from(code),
            }),
        })
    }

    fn describe(self) -> &'static str {
        match self {
            TagType::Audio => "audio",
            TagType::Video => "video",
            TagType::ScriptData => "script data",
        }
    }
}

/// Everything decoded from one tag's headers. Rebuilt from scratch for
/// each tag and discarded once the tag is consumed; only
/// [`AacConfig`] outlives a tag.
pub(crate) struct TagDescriptor {
    pub(crate) total_len: usize,
    pub(crate) filtered: bool,
    pub(crate) tag_type: TagType,
    pub(crate) frame_type: Option<FrameType>,
    pub(crate) codec_id: Option<CodecId>,
    pub(crate) avc_packet_type: Option<AvcPacketType>,
    pub(crate) sound_format: Option<SoundFormat>,
    pub(crate) sound_rate: Option<SoundRate>,
    pub(crate) sound_size: Option<SoundSize>,
    pub(crate) sound_type: Option<SoundType>,
    pub(crate) aac_packet_type: Option<AacPacketType>,
}

impl TagDescriptor {
    fn new(tag_type: TagType, total_len: usize, filtered: bool) -> Self {
        TagDescriptor {
            total_len,
            filtered,
            tag_type,
            frame_type: None,
            codec_id: None,
            avc_packet_type: None,
            sound_format: None,
            sound_rate: None,
            sound_size: None,
            sound_type: None,
            aac_packet_type: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        TagDescriptor::new(TagType::ScriptData, 0, false)
    }
}

impl std::fmt::Debug for TagDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("TagDescriptor");
        s.field("total_len", &self.total_len)
            .field("filtered", &self.filtered)
            .field("tag_type", &self.tag_type);
        match self.tag_type {
            TagType::Audio => {
                s.field("sound_format", &self.sound_format)
                    .field("sound_rate", &self.sound_rate)
                    .field("sound_size", &self.sound_size)
                    .field("sound_type", &self.sound_type)
                    .field("aac_packet_type", &self.aac_packet_type);
            }
            TagType::Video => {
                s.field("frame_type", &self.frame_type)
                    .field("codec_id", &self.codec_id)
                    .field("avc_packet_type", &self.avc_packet_type);
            }
            TagType::ScriptData => {}
        }
        s.finish()
    }
}

/// One demuxing session over one FLV stream.
///
/// Holds the only state that crosses tag boundaries: the parser state, the
/// tag counter, the absolute stream offset, and the persisted AAC
/// configuration. Not usable by concurrent callers; a session exclusively
/// owns its decode state.
#[derive(Debug)]
pub struct Demuxer {
    state: ParserState,

    /// Count of `PreviousTagSize` records consumed, which also numbers the
    /// upcoming tag (1-based).
    tag_count: u64,

    /// Absolute offset of the next unconsumed byte within the stream.
    pos: u64,

    aac_config: Option<AacConfig>,
}

impl Default for Demuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Demuxer {
    pub fn new() -> Self {
        Demuxer {
            state: ParserState::AwaitingHeader,
            tag_count: 0,
            pos: 0,
            aac_config: None,
        }
    }

    /// Consumes as many complete units from `buf` as possible, appending
    /// re-framed elementary-stream data to `sinks`, and returns the
    /// unconsumed suffix.
    ///
    /// A non-exhausted stream always needs more input after this returns:
    /// extend the returned remainder with further bytes and call again.
    /// Errors are fatal to the session; the demuxer never resynchronizes.
    pub fn advance<'a>(
        &mut self,
        mut buf: &'a [u8],
        sinks: &mut Sinks<'_>,
    ) -> Result<&'a [u8], Error> {
        loop {
            let consumed = match self.state {
                ParserState::AwaitingHeader => self.stream_header(buf)?,
                ParserState::AwaitingPreviousTagSize => self.previous_tag_size(buf)?,
                ParserState::AwaitingTag => self.tag(buf, sinks)?,
            };
            let Some(consumed) = consumed else {
                return Ok(buf); // need more input
            };
            self.pos += consumed as u64;
            buf = &buf[consumed..];
        }
    }

    fn stream_header(&mut self, buf: &[u8]) -> Result<Option<usize>, Error> {
        if buf.len() < STREAM_HEADER_LEN {
            return Ok(None);
        }
        let ctx = TagContext {
            tag: None,
            offset: self.pos,
        };
        let mut r = SliceReader::new(&buf[..STREAM_HEADER_LEN], ctx);
        let signature = r.bytes(3, "signature")?;
        if signature != b"FLV" {
            bail!(ErrorInt::Structural {
                ctx,
                field: "signature",
                expected: "\"FLV\"",
                got: format!(
                    "{:02x} {:02x} {:02x}",
                    signature[0], signature[1], signature[2]
                ),
            });
        }
        let version = r.u8("version")?;
        if version != 1 {
            bail!(ErrorInt::Structural {
                ctx,
                field: "version",
                expected: "1",
                got: version.to_string(),
            });
        }
        let flags = r.u8("type flags")?;
        if flags & 0b1111_1010 != 0 {
            bail!(ErrorInt::Structural {
                ctx,
                field: "reserved type flags",
                expected: "0",
                got: format!("0b{flags:08b}"),
            });
        }
        let header = StreamHeader {
            has_audio: flags & 0b100 != 0,
            has_video: flags & 0b001 != 0,
        };
        let data_offset = r.u32("DataOffset")?;
        if data_offset != u32::try_from(STREAM_HEADER_LEN).expect("header fits in u32") {
            bail!(ErrorInt::Structural {
                ctx,
                field: "DataOffset",
                expected: "9",
                got: data_offset.to_string(),
            });
        }
        debug!("[{ctx}] FLV version 1: {header:?}");
        self.state = ParserState::AwaitingPreviousTagSize;
        Ok(Some(STREAM_HEADER_LEN))
    }

    fn previous_tag_size(&mut self, buf: &[u8]) -> Result<Option<usize>, Error> {
        if buf.len() < PREVIOUS_TAG_SIZE_LEN {
            return Ok(None);
        }
        let ctx = TagContext {
            tag: None,
            offset: self.pos,
        };
        let mut r = SliceReader::new(&buf[..PREVIOUS_TAG_SIZE_LEN], ctx);
        let size = r.u32("PreviousTagSize")?;
        debug!("[{ctx}] PreviousTagSize{} = {size}", self.tag_count);
        self.tag_count += 1;
        self.state = ParserState::AwaitingTag;
        Ok(Some(PREVIOUS_TAG_SIZE_LEN))
    }

    fn tag(&mut self, buf: &[u8], sinks: &mut Sinks<'_>) -> Result<Option<usize>, Error> {
        if buf.len() < TAG_HEADER_LEN {
            return Ok(None);
        }
        // The 24-bit DataSize bounds the whole tag: nothing is consumed
        // (and no payload byte inspected) until the full tag is buffered.
        let payload_len = usize::from(buf[1]) << 16 | usize::from(buf[2]) << 8 | usize::from(buf[3]);
        let total_len = TAG_HEADER_LEN + payload_len;
        if buf.len() < total_len {
            return Ok(None);
        }

        let ctx = TagContext {
            tag: Some(self.tag_count),
            offset: self.pos,
        };
        let mut r = SliceReader::new(&buf[..total_len], ctx);
        let b = r.u8("tag type byte")?;
        if b >> 6 != 0 {
            bail!(ErrorInt::Structural {
                ctx,
                field: "tag reserved bits",
                expected: "0",
                got: format!("0b{:02b}", b >> 6),
            });
        }
        let filtered = (b >> 5) & 1 != 0;
        let tag_type = TagType::parse(b & 0b11111, ctx)?;
        let data_size = r.u24("DataSize")?;
        let timestamp = r.u24("Timestamp")?;
        let timestamp_extended = r.u8("TimestampExtended")?;
        let timestamp = u32::from(timestamp_extended) << 24 | timestamp;
        debug!(
            "[{ctx}] {} tag: {data_size}-byte payload, timestamp {timestamp} ms",
            tag_type.describe()
        );
        let stream_id = r.u24("StreamID")?;
        if stream_id != 0 {
            bail!(ErrorInt::Structural {
                ctx,
                field: "StreamID",
                expected: "0",
                got: stream_id.to_string(),
            });
        }
        let mut tag = TagDescriptor::new(tag_type, total_len, filtered);
        if filtered {
            // Decoding would require the encryption header and filter
            // params sub-parsers, which this crate doesn't have.
            bail!(ErrorInt::Unsupported {
                ctx,
                description: "pre-processed (encrypted) tag".to_owned(),
            });
        }
        trace!(
            "[{ctx}] payload: {:?}",
            LimitedHex::new(r.peek_remaining(), 64)
        );
        match tag_type {
            TagType::Audio => {
                codec::aac::parse_audio_tag(&mut r, &mut tag, &mut self.aac_config, sinks)?
            }
            TagType::Video => codec::h264::parse_video_tag(&mut r, &mut tag, sinks)?,
            TagType::ScriptData => script::parse_script_data(&mut r)?,
        }
        trace!(
            "[{ctx}] done at byte {} of {total_len}: {tag:?}",
            r.position()
        );
        self.state = ParserState::AwaitingPreviousTagSize;
        Ok(Some(total_len))
    }
}
