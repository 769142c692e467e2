// Copyright (C) 2023 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quick wrapper around `pretty-hex` to bound output size.
//!
//! Error messages and trace logs embed dumps of tag payloads, which can be
//! megabytes long; this caps them at a caller-chosen prefix.

use pretty_hex::PrettyHex;

pub(crate) struct LimitedHex<'a> {
    inner: &'a [u8],
    max_bytes: usize,
}

impl<'a> LimitedHex<'a> {
    pub(crate) fn new(inner: &'a [u8], max_bytes: usize) -> Self {
        Self { inner, max_bytes }
    }
}

impl std::fmt::Debug for LimitedHex<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (shown, omitted) = if self.inner.len() > self.max_bytes {
            (&self.inner[..self.max_bytes], self.inner.len() - self.max_bytes)
        } else {
            (self.inner, 0)
        };
        writeln!(f, "Length: {0} (0x{0:x}) bytes", self.inner.len())?;
        write!(
            f,
            "{:#?}",
            shown.hex_conf(pretty_hex::HexConfig {
                title: false,
                ..Default::default()
            })
        )?;
        if omitted > 0 {
            write!(f, "\n...{0} (0x{0:x}) bytes not shown...", omitted)?;
        }
        Ok(())
    }
}
