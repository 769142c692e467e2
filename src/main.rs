// Copyright (C) 2023 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line FLV demuxer: writes the raw H.264 and AAC elementary
//! streams next to the input.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;

use anyhow::Context as _;
use bytes::{Buf, BytesMut};
use clap::Parser;
use log::{error, info, warn};
use macula::{Demuxer, Sinks};

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// FLV file to read.
    input: PathBuf,

    /// Output path for the Annex B H.264 elementary stream.
    ///
    /// Defaults to the input path with an `.h264` extension.
    #[arg(long)]
    video_out: Option<PathBuf>,

    /// Output path for the ADTS AAC elementary stream.
    ///
    /// Defaults to the input path with an `.aac` extension.
    #[arg(long)]
    audio_out: Option<PathBuf>,

    /// Read size in bytes.
    #[arg(long, default_value_t = 1 << 16)]
    chunk_size: usize,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run(Args::parse()) {
        error!("Fatal: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), anyhow::Error> {
    let mut input = File::open(&args.input)
        .with_context(|| format!("unable to open {}", args.input.display()))?;
    let video_path = args
        .video_out
        .unwrap_or_else(|| args.input.with_extension("h264"));
    let audio_path = args
        .audio_out
        .unwrap_or_else(|| args.input.with_extension("aac"));
    let mut video = BufWriter::new(
        File::create(&video_path)
            .with_context(|| format!("unable to create {}", video_path.display()))?,
    );
    let mut audio = BufWriter::new(
        File::create(&audio_path)
            .with_context(|| format!("unable to create {}", audio_path.display()))?,
    );

    let mut demuxer = Demuxer::new();
    let mut pending = BytesMut::with_capacity(2 * args.chunk_size);
    let mut chunk = vec![0u8; args.chunk_size];
    loop {
        let n = input
            .read(&mut chunk)
            .with_context(|| format!("error reading {}", args.input.display()))?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&chunk[..n]);
        let rest_len = demuxer
            .advance(
                &pending,
                &mut Sinks {
                    video: &mut video,
                    audio: &mut audio,
                },
            )?
            .len();
        pending.advance(pending.len() - rest_len);
    }
    if !pending.is_empty() {
        warn!(
            "stream ends mid-unit: {} unconsumed trailing bytes",
            pending.len()
        );
    }
    video.flush().context("flushing video stream")?;
    audio.flush().context("flushing audio stream")?;
    info!(
        "wrote {} and {}",
        video_path.display(),
        audio_path.display()
    );
    Ok(())
}
