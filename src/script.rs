// Copyright (C) 2023 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Script data (`SCRIPTDATA`) tags: the restricted AMF0 value grammar FLV
//! uses for its `onMetaData` tag.
//!
//! Only the kinds that actually occur in metadata tags are decoded:
//! number, boolean, string, null, undefined, ECMA array, and the object
//! end marker. The object, movie clip, reference, strict array, date, and
//! long string kinds are rejected as unsupported by design rather than by
//! omission; a decoder for them would be dead weight here.
//!
//! See Adobe Flash Video File Format Specification v10.1, Annex E.4.4.1,
//! and the AMF0 specification.

use log::{debug, trace};

use crate::error::ErrorInt;
use crate::hex::LimitedHex;
use crate::reader::SliceReader;
use crate::Error;

/// ECMA arrays nest values; this bounds the recursion. Real `onMetaData`
/// payloads are at most a few levels deep.
const MAX_DEPTH: usize = 32;

/// One decoded script data value.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptValue {
    Number(f64),
    Boolean(bool),
    String(String),
    Null,
    Undefined,
    /// An "ECMA array": key/value pairs with a declared count and a
    /// trailing end marker.
    EcmaArray(Vec<(String, ScriptValue)>),
    /// An object end marker's type byte seen on its own, outside the
    /// 3-byte sequence that closes an ECMA array.
    ObjectEnd,
}

/// Parses a script data tag body: exactly two values, conventionally a
/// name string (`"onMetaData"`) and an ECMA array of metadata. Decoded
/// values are logged; bytes past the second value are skipped.
pub(crate) fn parse_script_data(r: &mut SliceReader<'_>) -> Result<(), Error> {
    let ctx = r.ctx();
    let name = parse_value(r, 0)?;
    let value = parse_value(r, 0)?;
    debug!("[{ctx}] script data: {name:?} => {value:?}");
    if r.remaining() > 0 {
        trace!("[{ctx}] {} bytes after the script data values", r.remaining());
    }
    Ok(())
}

fn parse_value(r: &mut SliceReader<'_>, depth: usize) -> Result<ScriptValue, Error> {
    let ctx = r.ctx();
    if depth > MAX_DEPTH {
        bail!(ErrorInt::Unsupported {
            ctx,
            description: format!("script data values nested deeper than {MAX_DEPTH} levels"),
        });
    }
    let kind = r.u8("script data value type")?;
    match kind {
        0 => Ok(ScriptValue::Number(r.f64("Number value")?)),
        1 => Ok(ScriptValue::Boolean(r.u8("Boolean value")? != 0)),
        2 => Ok(ScriptValue::String(parse_string(r)?)),
        5 => Ok(ScriptValue::Null),
        6 => Ok(ScriptValue::Undefined),
        8 => {
            let count = r.u32("ECMA array length")?;
            trace!("[{ctx}] ECMA array of {count} entries");
            let mut entries = Vec::new();
            for _ in 0..count {
                let key = parse_string(r)?;
                let value = parse_value(r, depth + 1)?;
                entries.push((key, value));
            }
            let marker = r.bytes(3, "object end marker")?;
            if marker != [0, 0, 9] {
                bail!(ErrorInt::Structural {
                    ctx,
                    field: "object end marker",
                    expected: "00 00 09",
                    got: format!("{:02x} {:02x} {:02x}", marker[0], marker[1], marker[2]),
                });
            }
            Ok(ScriptValue::EcmaArray(entries))
        }
        9 => Ok(ScriptValue::ObjectEnd),
        3 | 4 | 7 | 10 | 11 | 12 => {
            let name = match kind {
                3 => "Object",
                4 => "MovieClip",
                7 => "Reference",
                10 => "Strict array",
                11 => "Date",
                12 => "Long string",
                _ => unreachable!(),
            };
            bail!(ErrorInt::Unsupported {
                ctx,
                description: format!(
                    "{name} script data value (type {kind}); rest of value:\n{:?}",
                    LimitedHex::new(r.peek_remaining(), 32),
                ),
            });
        }
        _ => bail!(ErrorInt::InvalidFieldValue {
            ctx,
            field: "script data value type",
            value: i64::from(kind),
        }),
    }
}

/// A length-prefixed string without a leading type byte, as used both for
/// `String` values and for ECMA array keys.
fn parse_string(r: &mut SliceReader<'_>) -> Result<String, Error> {
    let len = r.u16("string length")?;
    let bytes = r.bytes(usize::from(len), "string data")?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::SliceReader;
    use crate::{ErrorKind, TagContext};

    fn value(payload: &[u8]) -> Result<(ScriptValue, usize), Error> {
        let mut r = SliceReader::new(payload, TagContext::dummy());
        let v = parse_value(&mut r, 0)?;
        Ok((v, r.position()))
    }

    #[test]
    fn number() {
        let mut payload = vec![0];
        payload.extend_from_slice(&30.0f64.to_be_bytes());
        assert_eq!(value(&payload).unwrap(), (ScriptValue::Number(30.0), 9));
    }

    #[test]
    fn boolean() {
        assert_eq!(value(&[1, 0]).unwrap(), (ScriptValue::Boolean(false), 2));
        assert_eq!(value(&[1, 7]).unwrap(), (ScriptValue::Boolean(true), 2));
    }

    #[test]
    fn string() {
        assert_eq!(
            value(b"\x02\x00\x0aonMetaData").unwrap(),
            (ScriptValue::String("onMetaData".to_owned()), 13)
        );
    }

    #[test]
    fn null_and_undefined() {
        assert_eq!(value(&[5]).unwrap(), (ScriptValue::Null, 1));
        assert_eq!(value(&[6]).unwrap(), (ScriptValue::Undefined, 1));
    }

    #[test]
    fn ecma_array_consumes_exactly_declared_entries() {
        let mut payload = vec![8, 0, 0, 0, 2]; // 2 entries
        payload.extend_from_slice(b"\x00\x08duration");
        payload.push(0);
        payload.extend_from_slice(&24.5f64.to_be_bytes());
        payload.extend_from_slice(b"\x00\x06stereo");
        payload.extend_from_slice(&[1, 1]);
        payload.extend_from_slice(&[0, 0, 9]);
        let expected_len = payload.len();
        payload.extend_from_slice(b"trailing"); // must not be consumed
        let (v, consumed) = value(&payload).unwrap();
        assert_eq!(
            v,
            ScriptValue::EcmaArray(vec![
                ("duration".to_owned(), ScriptValue::Number(24.5)),
                ("stereo".to_owned(), ScriptValue::Boolean(true)),
            ])
        );
        assert_eq!(consumed, expected_len);
    }

    #[test]
    fn ecma_array_bad_end_marker() {
        let payload = [8, 0, 0, 0, 0, 0, 0, 8];
        let e = value(&payload).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Structural);
    }

    #[test]
    fn nested_arrays() {
        let payload = [
            8, 0, 0, 0, 1, // outer, 1 entry
            0, 1, b'k', // key "k"
            8, 0, 0, 0, 0, 0, 0, 9, // inner, empty
            0, 0, 9, // outer end marker
        ];
        let (v, _) = value(&payload).unwrap();
        assert_eq!(
            v,
            ScriptValue::EcmaArray(vec![("k".to_owned(), ScriptValue::EcmaArray(vec![]))])
        );
    }

    #[test]
    fn unsupported_kinds() {
        for kind in [3, 4, 7, 10, 11, 12] {
            let e = value(&[kind, 0, 0]).unwrap_err();
            assert_eq!(e.kind(), ErrorKind::Unsupported, "kind {kind}");
        }
    }

    #[test]
    fn unknown_kind() {
        let e = value(&[13]).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidFieldValue);
    }

    #[test]
    fn excessive_nesting() {
        let mut payload = Vec::new();
        for _ in 0..40 {
            payload.extend_from_slice(&[8, 0, 0, 0, 1, 0, 1, b'k']);
        }
        payload.push(0);
        payload.extend_from_slice(&0.0f64.to_be_bytes());
        let e = value(&payload).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn two_values_with_trailing_bytes() {
        let mut payload = b"\x02\x00\x0aonMetaData".to_vec();
        payload.extend_from_slice(&[8, 0, 0, 0, 0, 0, 0, 9]);
        payload.push(0xff); // trailing byte, skipped
        let mut r = SliceReader::new(&payload, TagContext::dummy());
        parse_script_data(&mut r).unwrap();
        assert_eq!(r.remaining(), 1);
    }
}
