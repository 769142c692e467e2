// Copyright (C) 2023 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders for synthetic FLV streams, shared between the unit tests.

use bytes::{BufMut, BytesMut};

pub(crate) fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("macula=trace"),
    )
    .is_test(true)
    .try_init();
}

/// Assembles a stream: the 9-byte header (audio and video present), then
/// each tag with its preceding `PreviousTagSize`, then the final
/// `PreviousTagSize`.
pub(crate) struct StreamBuilder {
    buf: BytesMut,
    prev_tag_len: u32,
}

impl StreamBuilder {
    pub(crate) fn new() -> Self {
        let mut buf = BytesMut::new();
        buf.put_slice(b"FLV\x01\x05");
        buf.put_u32(9); // DataOffset
        StreamBuilder {
            buf,
            prev_tag_len: 0,
        }
    }

    pub(crate) fn tag(mut self, tag_type: u8, timestamp: u32, payload: &[u8]) -> Self {
        self.buf.put_u32(self.prev_tag_len);
        self.buf.put_u8(tag_type);
        self.buf.put_uint(payload.len() as u64, 3);
        self.buf.put_uint(u64::from(timestamp & 0xff_ffff), 3);
        self.buf.put_u8((timestamp >> 24) as u8);
        self.buf.put_uint(0, 3); // StreamID
        self.buf.put_slice(payload);
        self.prev_tag_len = 11 + payload.len() as u32;
        self
    }

    pub(crate) fn build(mut self) -> Vec<u8> {
        self.buf.put_u32(self.prev_tag_len);
        self.buf.to_vec()
    }
}

/// A video tag payload holding an `AVCDecoderConfigurationRecord` with the
/// given parameter sets (key frame, lengthSizeMinusOne 3).
pub(crate) fn avc_sequence_header(sps: &[&[u8]], pps: &[&[u8]]) -> Vec<u8> {
    let mut p = BytesMut::new();
    p.put_slice(&[0x17, 0, 0, 0, 0]); // key frame + AVC, sequence header, ct 0
    p.put_u8(1); // configurationVersion
    p.put_slice(&[0x64, 0x00, 0x1e]); // profile, compatibility, level
    p.put_u8(0xff); // reserved + lengthSizeMinusOne 3
    p.put_u8(0xe0 | sps.len() as u8);
    for s in sps {
        p.put_u16(s.len() as u16);
        p.put_slice(s);
    }
    p.put_u8(pps.len() as u8);
    for s in pps {
        p.put_u16(s.len() as u16);
        p.put_slice(s);
    }
    p.to_vec()
}

/// A video tag payload holding 4-byte-length-prefixed NAL units (key
/// frame, composition time 0).
pub(crate) fn avc_nalus(nals: &[&[u8]]) -> Vec<u8> {
    let mut p = BytesMut::new();
    p.put_slice(&[0x17, 1, 0, 0, 0]);
    for nal in nals {
        p.put_u32(nal.len() as u32);
        p.put_slice(nal);
    }
    p.to_vec()
}

/// The expected Annex B form of the given NAL units.
pub(crate) fn annex_b(nals: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in nals {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(nal);
    }
    out
}

/// An audio tag payload holding an AAC sequence header (44 kHz, 16-bit,
/// stereo `AUDIODATA` header) with the given AudioSpecificConfig fields.
pub(crate) fn aac_sequence_header(profile: u8, frequency_index: u8, channel_config: u8) -> Vec<u8> {
    vec![
        0xaf,
        0,
        profile << 3 | frequency_index >> 1,
        (frequency_index & 1) << 7 | (channel_config & 0xf) << 3,
    ]
}

/// An audio tag payload holding one raw AAC frame.
pub(crate) fn aac_raw(frame: &[u8]) -> Vec<u8> {
    let mut p = vec![0xaf, 1];
    p.extend_from_slice(frame);
    p
}

/// The expected ADTS framing of `payload`, computed independently of the
/// demuxer's `BitWriter`-based synthesis.
pub(crate) fn adts_frame(profile: u8, frequency_index: u8, channel_config: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len() + 7;
    let mut out = vec![
        0xff,
        0xf1,
        (profile - 1) << 6 | frequency_index << 2 | channel_config >> 2,
        (channel_config & 0b11) << 6 | (len >> 11) as u8,
        (len >> 3) as u8,
        ((len & 0b111) << 5) as u8 | 0b11111,
        0b1111_1100,
    ];
    out.extend_from_slice(payload);
    out
}

/// A script data tag payload: `"onMetaData"` plus a two-entry ECMA array.
pub(crate) fn script_payload() -> Vec<u8> {
    let mut p = BytesMut::new();
    p.put_u8(2); // String
    p.put_u16(10);
    p.put_slice(b"onMetaData");
    p.put_u8(8); // ECMA array
    p.put_u32(2);
    p.put_u16(8);
    p.put_slice(b"duration");
    p.put_u8(0); // Number
    p.put_f64(24.5);
    p.put_u16(6);
    p.put_slice(b"stereo");
    p.put_u8(1); // Boolean
    p.put_u8(1);
    p.put_slice(&[0, 0, 9]);
    p.to_vec()
}
