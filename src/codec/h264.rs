// Copyright (C) 2023 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AVC video tags: `VIDEODATA` headers, the decoder configuration record
//! carried by sequence-header tags, and Annex B re-framing of
//! length-prefixed NAL units.
//!
//! This doesn't inspect the contents of the NAL units; SPS and PPS are
//! treated as opaque byte strings and emitted as-is behind start codes.
//!
//! See the following references:
//! *   Adobe Flash Video File Format Specification v10.1, Annex E.4.3.1
//!     (`VIDEODATA`) and E.4.3.2 (`AVCVIDEOPACKET`).
//! *   ISO/IEC 14496-15 section 5.2.4.1: `AVCDecoderConfigurationRecord`.

use log::{debug, trace};

use crate::demux::TagDescriptor;
use crate::error::ErrorInt;
use crate::reader::SliceReader;
use crate::{Error, TagContext};

use super::Sinks;

/// The 4-byte Annex B start code prefixed to every emitted NAL unit.
const START_CODE: [u8; 4] = [0, 0, 0, 1];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FrameType {
    KeyFrame,
    InterFrame,
    DisposableInterFrame,
    GeneratedKeyFrame,
    VideoInfoOrCommandFrame,
}

impl FrameType {
    fn parse(code: u8, ctx: TagContext) -> Result<Self, Error> {
        Ok(match code {
            1 => FrameType::KeyFrame,
            2 => FrameType::InterFrame,
            3 => FrameType::DisposableInterFrame,
            4 => FrameType::GeneratedKeyFrame,
            5 => FrameType::VideoInfoOrCommandFrame,
            _ => bail!(ErrorInt::InvalidFieldValue {
                ctx,
                field: "FrameType",
                value: i64::from(code),
            }),
        })
    }

    fn describe(self) -> &'static str {
        match self {
            FrameType::KeyFrame => "key frame",
            FrameType::InterFrame => "inter frame",
            FrameType::DisposableInterFrame => "disposable inter frame",
            FrameType::GeneratedKeyFrame => "generated key frame",
            FrameType::VideoInfoOrCommandFrame => "video info/command frame",
        }
    }
}

/// The `CodecID` codes defined by the FLV `VIDEODATA` header. All are
/// recognized; only [`CodecId::Avc`] is supported.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum CodecId {
    SorensonH263,
    ScreenVideo,
    On2Vp6,
    On2Vp6WithAlpha,
    ScreenVideoV2,
    Avc,
}

impl CodecId {
    fn parse(code: u8, ctx: TagContext) -> Result<Self, Error> {
        Ok(match code {
            2 => CodecId::SorensonH263,
            3 => CodecId::ScreenVideo,
            4 => CodecId::On2Vp6,
            5 => CodecId::On2Vp6WithAlpha,
            6 => CodecId::ScreenVideoV2,
            7 => CodecId::Avc,
            _ => bail!(ErrorInt::InvalidFieldValue {
                ctx,
                field: "CodecID",
                value: i64::from(code),
            }),
        })
    }

    fn describe(self) -> &'static str {
        match self {
            CodecId::SorensonH263 => "Sorenson H.263",
            CodecId::ScreenVideo => "Screen video",
            CodecId::On2Vp6 => "On2 VP6",
            CodecId::On2Vp6WithAlpha => "On2 VP6 with alpha channel",
            CodecId::ScreenVideoV2 => "Screen video version 2",
            CodecId::Avc => "AVC",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum AvcPacketType {
    SequenceHeader,
    Nalu,
    EndOfSequence,
}

impl AvcPacketType {
    fn parse(code: u8, ctx: TagContext) -> Result<Self, Error> {
        Ok(match code {
            0 => AvcPacketType::SequenceHeader,
            1 => AvcPacketType::Nalu,
            2 => AvcPacketType::EndOfSequence,
            _ => bail!(ErrorInt::InvalidFieldValue {
                ctx,
                field: "AVCPacketType",
                value: i64::from(code),
            }),
        })
    }
}

/// Parses one video tag's payload: the `VIDEODATA` header byte, the
/// `AVCVIDEOPACKET` header, and then the packet-type-specific body.
/// Command frames and every non-AVC codec are rejected as unsupported.
pub(crate) fn parse_video_tag(
    r: &mut SliceReader<'_>,
    tag: &mut TagDescriptor,
    sinks: &mut Sinks<'_>,
) -> Result<(), Error> {
    let ctx = r.ctx();
    let b = r.u8("VIDEODATA header")?;
    let frame_type = FrameType::parse(b >> 4, ctx)?;
    let codec_id = CodecId::parse(b & 0b1111, ctx)?;
    debug!(
        "[{ctx}] video: {}, {}",
        frame_type.describe(),
        codec_id.describe()
    );
    tag.frame_type = Some(frame_type);
    tag.codec_id = Some(codec_id);
    if frame_type == FrameType::VideoInfoOrCommandFrame {
        bail!(ErrorInt::Unsupported {
            ctx,
            description: "video info/command frame".to_owned(),
        });
    }
    if codec_id != CodecId::Avc {
        bail!(ErrorInt::Unsupported {
            ctx,
            description: format!("{} video", codec_id.describe()),
        });
    }

    let packet_type = AvcPacketType::parse(r.u8("AVCPacketType")?, ctx)?;
    tag.avc_packet_type = Some(packet_type);
    let composition_time = r.i24("CompositionTime")?;
    if packet_type != AvcPacketType::Nalu && composition_time != 0 {
        bail!(ErrorInt::InvalidFieldValue {
            ctx,
            field: "CompositionTime",
            value: i64::from(composition_time),
        });
    }
    trace!("[{ctx}] composition time {composition_time} ms");
    match packet_type {
        AvcPacketType::SequenceHeader => parse_decoder_configuration_record(r, sinks),
        AvcPacketType::Nalu => parse_nal_units(r, sinks),
        AvcPacketType::EndOfSequence => {
            debug!("[{ctx}] end of sequence");
            Ok(())
        }
    }
}

/// Parses an `AVCDecoderConfigurationRecord`, emitting each SPS and PPS to
/// the video sink behind a start code. The record occupies the remainder
/// of the tag.
fn parse_decoder_configuration_record(
    r: &mut SliceReader<'_>,
    sinks: &mut Sinks<'_>,
) -> Result<(), Error> {
    let ctx = r.ctx();
    let version = r.u8("configurationVersion")?;
    if version != 1 {
        bail!(ErrorInt::Structural {
            ctx,
            field: "configurationVersion",
            expected: "1",
            got: version.to_string(),
        });
    }
    let profile = r.u8("AVCProfileIndication")?;
    let compatibility = r.u8("profile_compatibility")?;
    let level = r.u8("AVCLevelIndication")?;
    debug!(
        "[{ctx}] AVC profile 0x{profile:02x}, compatibility 0x{compatibility:02x}, \
         level 0x{level:02x}"
    );

    let b = r.u8("lengthSizeMinusOne")?;
    if b >> 2 != 0b111111 {
        bail!(ErrorInt::Structural {
            ctx,
            field: "lengthSizeMinusOne reserved bits",
            expected: "0b111111",
            got: format!("0b{:06b}", b >> 2),
        });
    }
    // NAL unit extraction assumes 4-byte length prefixes (value 3).
    let length_size_minus_one = b & 0b11;
    debug!("[{ctx}] lengthSizeMinusOne {length_size_minus_one}");

    let b = r.u8("numOfSequenceParameterSets")?;
    if b >> 5 != 0b111 {
        bail!(ErrorInt::Structural {
            ctx,
            field: "numOfSequenceParameterSets reserved bits",
            expected: "0b111",
            got: format!("0b{:03b}", b >> 5),
        });
    }
    let num_sps = b & 0b11111;
    for _ in 0..num_sps {
        let len = r.u16("sequenceParameterSetLength")?;
        let sps = r.bytes(usize::from(len), "sequence parameter set")?;
        emit_nal(sinks, ctx, sps)?;
    }
    let num_pps = r.u8("numOfPictureParameterSets")?;
    for _ in 0..num_pps {
        let len = r.u16("pictureParameterSetLength")?;
        let pps = r.bytes(usize::from(len), "picture parameter set")?;
        emit_nal(sinks, ctx, pps)?;
    }
    debug!("[{ctx}] wrote {num_sps} SPS and {num_pps} PPS");
    if r.remaining() > 0 {
        trace!(
            "[{ctx}] {} bytes after the decoder configuration record",
            r.remaining()
        );
    }
    Ok(())
}

/// Re-frames one or more 4-byte-length-prefixed NAL units as Annex B. The
/// units must fill the remainder of the tag exactly; a length that would
/// cross the tag boundary fails rather than reading past it.
fn parse_nal_units(r: &mut SliceReader<'_>, sinks: &mut Sinks<'_>) -> Result<(), Error> {
    let ctx = r.ctx();
    let mut count = 0u32;
    while r.remaining() > 0 {
        let len = r.u32("NAL unit length")?;
        let len = usize::try_from(len).expect("u32 fits in usize");
        let nal = r.bytes(len, "NAL unit")?;
        trace!("[{ctx}] NAL unit of {len} bytes");
        emit_nal(sinks, ctx, nal)?;
        count += 1;
    }
    debug!("[{ctx}] wrote {count} NAL units");
    Ok(())
}

fn emit_nal(sinks: &mut Sinks<'_>, ctx: TagContext, nal: &[u8]) -> Result<(), Error> {
    super::write_all(sinks.video, "video", ctx, &START_CODE)?;
    super::write_all(sinks.video, "video", ctx, nal)
}
