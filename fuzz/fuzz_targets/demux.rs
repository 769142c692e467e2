// Copyright (C) 2023 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]
use libfuzzer_sys::fuzz_target;

// The first byte picks the chunk size, exercising the resumable path as
// well as the parsers themselves.
fuzz_target!(|data: &[u8]| {
    let Some((&step, rest)) = data.split_first() else {
        return;
    };
    let step = usize::from(step).max(1);
    let mut demuxer = macula::Demuxer::new();
    let mut video = Vec::<u8>::new();
    let mut audio = Vec::<u8>::new();
    let mut pending: Vec<u8> = Vec::new();
    for chunk in rest.chunks(step) {
        pending.extend_from_slice(chunk);
        let rest_len = {
            let mut sinks = macula::Sinks {
                video: &mut video,
                audio: &mut audio,
            };
            match demuxer.advance(&pending, &mut sinks) {
                Ok(r) => r.len(),
                Err(_) => return,
            }
        };
        let consumed = pending.len() - rest_len;
        pending.drain(..consumed);
    }
});
