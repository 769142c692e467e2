// Copyright (C) 2023 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AAC audio tags: `AUDIODATA` headers, the 2-byte AudioSpecificConfig
//! carried by sequence-header tags, and ADTS synthesis for raw frames.
//!
//! See the following references:
//! *   Adobe Flash Video File Format Specification v10.1, Annex E.4.2.1
//!     (`AUDIODATA`) and E.4.2.2 (`AACAUDIODATA`).
//! *   ISO/IEC 14496-3 section 1.6.2.1: AudioSpecificConfig.
//! *   ISO/IEC 13818-7 / 14496-3: the ADTS fixed and variable headers.

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};
use log::debug;

use crate::demux::TagDescriptor;
use crate::error::ErrorInt;
use crate::reader::SliceReader;
use crate::{Error, TagContext};

use super::Sinks;

/// An ADTS header is 7 bytes: no CRC, as `protection_absent` is always set.
const ADTS_HEADER_LEN: usize = 7;

/// The 13-bit ADTS `aac_frame_length` bounds the payload an ADTS frame can
/// carry.
const ADTS_MAX_FRAME_LEN: usize = (1 << 13) - 1;

/// The `SoundFormat` codes defined by the FLV `AUDIODATA` header. Codes 12
/// and 13 are undefined and rejected; everything here is recognized, but
/// only [`SoundFormat::Aac`] payloads are decoded further.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SoundFormat {
    LinearPcmPlatformEndian,
    Adpcm,
    Mp3,
    LinearPcmLittleEndian,
    Nellymoser16kHzMono,
    Nellymoser8kHzMono,
    Nellymoser,
    G711ALaw,
    G711MuLaw,
    Reserved,
    Aac,
    Speex,
    Mp38kHz,
    DeviceSpecific,
}

impl SoundFormat {
    fn parse(code: u8, ctx: TagContext) -> Result<Self, Error> {
        Ok(match code {
            0 => SoundFormat::LinearPcmPlatformEndian,
            1 => SoundFormat::Adpcm,
            2 => SoundFormat::Mp3,
            3 => SoundFormat::LinearPcmLittleEndian,
            4 => SoundFormat::Nellymoser16kHzMono,
            5 => SoundFormat::Nellymoser8kHzMono,
            6 => SoundFormat::Nellymoser,
            7 => SoundFormat::G711ALaw,
            8 => SoundFormat::G711MuLaw,
            9 => SoundFormat::Reserved,
            10 => SoundFormat::Aac,
            11 => SoundFormat::Speex,
            14 => SoundFormat::Mp38kHz,
            15 => SoundFormat::DeviceSpecific,
            _ => bail!(ErrorInt::InvalidFieldValue {
                ctx,
                field: "SoundFormat",
                value: i64::from(code),
            }),
        })
    }

    fn describe(self) -> &'static str {
        match self {
            SoundFormat::LinearPcmPlatformEndian => "linear PCM, platform endian",
            SoundFormat::Adpcm => "ADPCM",
            SoundFormat::Mp3 => "MP3",
            SoundFormat::LinearPcmLittleEndian => "linear PCM, little endian",
            SoundFormat::Nellymoser16kHzMono => "Nellymoser 16 kHz mono",
            SoundFormat::Nellymoser8kHzMono => "Nellymoser 8 kHz mono",
            SoundFormat::Nellymoser => "Nellymoser",
            SoundFormat::G711ALaw => "G.711 A-law logarithmic PCM",
            SoundFormat::G711MuLaw => "G.711 mu-law logarithmic PCM",
            SoundFormat::Reserved => "reserved",
            SoundFormat::Aac => "AAC",
            SoundFormat::Speex => "Speex",
            SoundFormat::Mp38kHz => "MP3 8 kHz",
            SoundFormat::DeviceSpecific => "device-specific sound",
        }
    }
}

/// The 2-bit `SoundRate`; total, so parsing can't fail.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SoundRate {
    Rate5500,
    Rate11000,
    Rate22000,
    Rate44000,
}

impl SoundRate {
    fn from_bits(code: u8) -> Self {
        match code & 0b11 {
            0 => SoundRate::Rate5500,
            1 => SoundRate::Rate11000,
            2 => SoundRate::Rate22000,
            _ => SoundRate::Rate44000,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            SoundRate::Rate5500 => "5.5 kHz",
            SoundRate::Rate11000 => "11 kHz",
            SoundRate::Rate22000 => "22 kHz",
            SoundRate::Rate44000 => "44 kHz",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SoundSize {
    Bits8,
    Bits16,
}

impl SoundSize {
    fn from_bit(bit: u8) -> Self {
        if bit & 1 == 0 {
            SoundSize::Bits8
        } else {
            SoundSize::Bits16
        }
    }

    fn describe(self) -> &'static str {
        match self {
            SoundSize::Bits8 => "8-bit samples",
            SoundSize::Bits16 => "16-bit samples",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SoundType {
    Mono,
    Stereo,
}

impl SoundType {
    fn from_bit(bit: u8) -> Self {
        if bit & 1 == 0 {
            SoundType::Mono
        } else {
            SoundType::Stereo
        }
    }

    fn describe(self) -> &'static str {
        match self {
            SoundType::Mono => "mono",
            SoundType::Stereo => "stereo",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum AacPacketType {
    SequenceHeader,
    Raw,
}

impl AacPacketType {
    fn parse(code: u8, ctx: TagContext) -> Result<Self, Error> {
        Ok(match code {
            0 => AacPacketType::SequenceHeader,
            1 => AacPacketType::Raw,
            _ => bail!(ErrorInt::InvalidFieldValue {
                ctx,
                field: "AACPacketType",
                value: i64::from(code),
            }),
        })
    }
}

/// The audioObjectType values FLV sequence headers carry. ADTS has room for
/// only the first three object types (its 2-bit `profile` is the object
/// type minus one), which conveniently are the only ones seen here.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum AacProfile {
    Main,
    LowComplexity,
    ScalableSampleRate,
}

impl AacProfile {
    fn parse(code: u8, ctx: TagContext) -> Result<Self, Error> {
        Ok(match code {
            1 => AacProfile::Main,
            2 => AacProfile::LowComplexity,
            3 => AacProfile::ScalableSampleRate,
            _ => bail!(ErrorInt::InvalidFieldValue {
                ctx,
                field: "AAC profile (audioObjectType)",
                value: i64::from(code),
            }),
        })
    }

    fn describe(self) -> &'static str {
        match self {
            AacProfile::Main => "AAC Main",
            AacProfile::LowComplexity => "AAC LC",
            AacProfile::ScalableSampleRate => "AAC SSR",
        }
    }

    fn adts_profile(self) -> u8 {
        match self {
            AacProfile::Main => 0,
            AacProfile::LowComplexity => 1,
            AacProfile::ScalableSampleRate => 2,
        }
    }
}

/// Sampling frequency index descriptions, ISO/IEC 14496-3 section 1.6.3.3.
/// All 16 codes are recognized index values; the reserved and escape codes
/// are stored as-is.
#[rustfmt::skip]
const SAMPLING_FREQUENCIES: [&str; 16] = [
    /* 0x0 */ "96000 Hz",
    /* 0x1 */ "88200 Hz",
    /* 0x2 */ "64000 Hz",
    /* 0x3 */ "48000 Hz",
    /* 0x4 */ "44100 Hz",
    /* 0x5 */ "32000 Hz",
    /* 0x6 */ "24000 Hz",
    /* 0x7 */ "22050 Hz",
    /* 0x8 */ "16000 Hz",
    /* 0x9 */ "12000 Hz",
    /* 0xa */ "11025 Hz",
    /* 0xb */ "8000 Hz",
    /* 0xc */ "reserved",
    /* 0xd */ "reserved",
    /* 0xe */ "reserved",
    /* 0xf */ "escape value",
];

/// Channel configuration names, ISO/IEC 14496-3 Table 1.19. Values above 7
/// are logged as "reserved" but kept.
#[rustfmt::skip]
const CHANNEL_CONFIGS: [&str; 8] = [
    /* 0 */ "defined in AudioDecoderSpecificConfig",
    /* 1 */ "mono",
    /* 2 */ "stereo",
    /* 3 */ "3.0",
    /* 4 */ "4.0",
    /* 5 */ "5.0",
    /* 6 */ "5.1",
    /* 7 */ "7.1",
];

/// The decoder parameters persisted from an AAC sequence-header tag; the
/// only decode state that outlives a single tag. Every raw AAC frame needs
/// these three fields to build its ADTS header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct AacConfig {
    profile: AacProfile,
    frequency_index: u8,
    channel_config: u8,
}

impl AacConfig {
    /// Parses the 2-byte AudioSpecificConfig a sequence-header tag carries.
    fn parse(r: &mut SliceReader<'_>) -> Result<Self, Error> {
        let ctx = r.ctx();
        let raw = r.bytes(2, "AudioSpecificConfig")?;
        let mut br = BitReader::endian(raw, BigEndian);
        // Exactly 16 bits from a 2-byte slice; these reads can't fail.
        let (profile_code, frequency_index, channel_config, tail): (u8, u8, u8, u8) =
            (|| -> std::io::Result<_> { Ok((br.read(5)?, br.read(4)?, br.read(4)?, br.read(3)?)) })(
            )
            .expect("16-bit read from 2-byte slice");
        let profile = AacProfile::parse(profile_code, ctx)?;
        let channel_name = CHANNEL_CONFIGS
            .get(usize::from(channel_config))
            .copied()
            .unwrap_or("reserved");
        debug!(
            "[{ctx}] AudioSpecificConfig: {}, {}, channels: {channel_name}",
            profile.describe(),
            SAMPLING_FREQUENCIES[usize::from(frequency_index)],
        );
        if tail != 0 {
            bail!(ErrorInt::InvalidFieldValue {
                ctx,
                field: "AudioSpecificConfig trailing bits",
                value: i64::from(tail),
            });
        }
        Ok(AacConfig {
            profile,
            frequency_index,
            channel_config,
        })
    }

    /// Synthesizes the 7-byte ADTS header (MPEG-4, no CRC) framing a raw
    /// payload of `payload_len` bytes.
    fn adts_header(&self, payload_len: usize, ctx: TagContext) -> Result<Vec<u8>, Error> {
        let frame_len = payload_len + ADTS_HEADER_LEN;
        if frame_len > ADTS_MAX_FRAME_LEN {
            bail!(ErrorInt::Unsupported {
                ctx,
                description: format!(
                    "{payload_len}-byte AAC frame exceeds the 13-bit ADTS frame length"
                ),
            });
        }
        let mut header = Vec::with_capacity(ADTS_HEADER_LEN);
        let mut w = BitWriter::endian(&mut header, BigEndian);
        // 56 bits to a Vec, each value masked to its width; can't fail.
        (|| -> std::io::Result<()> {
            w.write(12, 0xfffu16)?; // syncword
            w.write_bit(false)?; // ID: MPEG-4
            w.write(2, 0u8)?; // layer
            w.write_bit(true)?; // protection_absent: no CRC
            w.write(2, self.profile.adts_profile())?;
            w.write(4, self.frequency_index)?;
            w.write_bit(false)?; // private_bit
            w.write(3, self.channel_config & 0b111)?;
            w.write_bit(false)?; // original/copy
            w.write_bit(false)?; // home
            w.write_bit(false)?; // copyright_identification_bit
            w.write_bit(false)?; // copyright_identification_start
            w.write(13, frame_len as u16)?;
            w.write(11, 0x7ffu16)?; // buffer fullness: signals VBR
            w.write(2, 0u8)?; // number_of_raw_data_blocks_in_frame - 1
            Ok(())
        })()
        .expect("56-bit write to Vec");
        debug_assert_eq!(header.len(), ADTS_HEADER_LEN);
        Ok(header)
    }
}

/// Parses one audio tag's payload: the `AUDIODATA` header byte, then for
/// AAC either the sequence header (updating `config`) or a raw frame
/// (re-framed as ADTS and appended to the audio sink). Recognized non-AAC
/// formats are logged and left undecoded.
pub(crate) fn parse_audio_tag(
    r: &mut SliceReader<'_>,
    tag: &mut TagDescriptor,
    config: &mut Option<AacConfig>,
    sinks: &mut Sinks<'_>,
) -> Result<(), Error> {
    let ctx = r.ctx();
    let b = r.u8("AUDIODATA header")?;
    let format = SoundFormat::parse(b >> 4, ctx)?;
    let rate = SoundRate::from_bits(b >> 2);
    let size = SoundSize::from_bit(b >> 1);
    let sound_type = SoundType::from_bit(b);
    debug!(
        "[{ctx}] audio: {}, {}, {}, {}",
        format.describe(),
        rate.describe(),
        size.describe(),
        sound_type.describe(),
    );
    tag.sound_format = Some(format);
    tag.sound_rate = Some(rate);
    tag.sound_size = Some(size);
    tag.sound_type = Some(sound_type);
    if format != SoundFormat::Aac {
        debug!(
            "[{ctx}] leaving {}-byte {} payload undecoded",
            r.remaining(),
            format.describe(),
        );
        return Ok(());
    }

    let packet_type = AacPacketType::parse(r.u8("AACPacketType")?, ctx)?;
    tag.aac_packet_type = Some(packet_type);
    match packet_type {
        AacPacketType::SequenceHeader => {
            let c = AacConfig::parse(r)?;
            if config.is_some() {
                debug!("[{ctx}] replacing AAC configuration");
            }
            *config = Some(c);
        }
        AacPacketType::Raw => {
            let Some(config) = config else {
                bail!(ErrorInt::FailedPrecondition {
                    ctx,
                    description: "raw AAC frame before any AAC sequence header".to_owned(),
                });
            };
            let payload = r.bytes(r.remaining(), "raw AAC frame")?;
            let header = config.adts_header(payload.len(), ctx)?;
            super::write_all(sinks.audio, "audio", ctx, &header)?;
            super::write_all(sinks.audio, "audio", ctx, payload)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::TagDescriptor;
    use crate::testutil;
    use crate::ErrorKind;

    fn parse(
        payload: &[u8],
        config: &mut Option<AacConfig>,
        audio: &mut Vec<u8>,
    ) -> Result<(), crate::Error> {
        testutil::init_logging();
        let mut video = Vec::<u8>::new();
        let mut sinks = Sinks {
            video: &mut video,
            audio,
        };
        let mut r = SliceReader::new(payload, crate::TagContext::dummy());
        let mut tag = TagDescriptor::empty();
        parse_audio_tag(&mut r, &mut tag, config, &mut sinks)
    }

    #[test]
    fn sequence_header_persists_config() {
        let mut config = None;
        let mut audio = Vec::new();
        parse(
            &testutil::aac_sequence_header(2, 4, 2),
            &mut config,
            &mut audio,
        )
        .unwrap();
        assert_eq!(
            config,
            Some(AacConfig {
                profile: AacProfile::LowComplexity,
                frequency_index: 4,
                channel_config: 2,
            })
        );
        assert_eq!(audio, b"");
    }

    #[test]
    fn reserved_channel_config_accepted() {
        let mut config = None;
        let mut audio = Vec::new();
        parse(
            &testutil::aac_sequence_header(1, 11, 9),
            &mut config,
            &mut audio,
        )
        .unwrap();
        assert_eq!(
            config,
            Some(AacConfig {
                profile: AacProfile::Main,
                frequency_index: 11,
                channel_config: 9,
            })
        );
    }

    #[test]
    fn bad_profile() {
        let e = parse(
            &testutil::aac_sequence_header(4, 4, 2),
            &mut None,
            &mut Vec::new(),
        )
        .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidFieldValue);
    }

    #[test]
    fn nonzero_trailing_bits() {
        let mut payload = testutil::aac_sequence_header(2, 4, 2);
        *payload.last_mut().unwrap() |= 0b101;
        let e = parse(&payload, &mut None, &mut Vec::new()).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidFieldValue);
    }

    #[test]
    fn raw_frame_before_config() {
        let e = parse(&testutil::aac_raw(b"frame"), &mut None, &mut Vec::new()).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::FailedPrecondition);
    }

    #[test]
    fn adts_round_trip() {
        let config = AacConfig {
            profile: AacProfile::LowComplexity,
            frequency_index: 4,
            channel_config: 2,
        };
        let payload = [0u8; 100];
        let header = config
            .adts_header(payload.len(), crate::TagContext::dummy())
            .unwrap();

        // Decode the header back; it must recover the stored triplet and
        // frame_length == payload + 7.
        assert_eq!(&header[..2], b"\xff\xf1");
        assert_eq!(header[2] >> 6, config.profile.adts_profile());
        assert_eq!((header[2] >> 2) & 0xf, config.frequency_index);
        let channels = (header[2] & 0b1) << 2 | header[3] >> 6;
        assert_eq!(channels, config.channel_config);
        let frame_len = usize::from(header[3] & 0b11) << 11
            | usize::from(header[4]) << 3
            | usize::from(header[5] >> 5);
        assert_eq!(frame_len, payload.len() + 7);
        assert_eq!(header[5] & 0b11111, 0b11111);
        assert_eq!(header[6], 0b11111100);
    }

    #[test]
    fn raw_frame_synthesizes_adts() {
        let mut config = None;
        let mut audio = Vec::new();
        parse(
            &testutil::aac_sequence_header(2, 4, 2),
            &mut config,
            &mut audio,
        )
        .unwrap();
        parse(&testutil::aac_raw(b"rawdata"), &mut config, &mut audio).unwrap();
        assert_eq!(audio, testutil::adts_frame(2, 4, 2, b"rawdata"));
    }

    #[test]
    fn oversized_raw_frame() {
        let mut config = Some(AacConfig {
            profile: AacProfile::LowComplexity,
            frequency_index: 4,
            channel_config: 2,
        });
        let frame = testutil::aac_raw(&vec![0u8; 9_000]);
        let e = parse(&frame, &mut config, &mut Vec::new()).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn non_aac_payload_left_undecoded() {
        let mut config = None;
        let mut audio = Vec::new();
        // MP3, 44 kHz, 16-bit, stereo.
        parse(&[0x2f, 1, 2, 3], &mut config, &mut audio).unwrap();
        assert_eq!(audio, b"");
        assert_eq!(config, None);
    }

    #[test]
    fn undefined_sound_format() {
        let e = parse(&[12 << 4], &mut None, &mut Vec::new()).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidFieldValue);
    }

    #[test]
    fn bad_aac_packet_type() {
        let e = parse(&[0xaf, 2], &mut None, &mut Vec::new()).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidFieldValue);
    }
}
