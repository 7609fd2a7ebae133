//! Java's "modified UTF-8", the payload encoding produced by `writeUTF`.
//!
//! It differs from standard UTF-8 in two places: NUL is written as the
//! two-byte sequence `C0 80`, and characters outside the Basic Multilingual
//! Plane are written as a UTF-16 surrogate pair with each half taking three
//! bytes. Decoding accepts everything Java's `readUTF` accepts, as long as
//! the result is a valid Rust string.

use crate::frame::FrameError;

/// Number of bytes [`encode`] produces for `text`.
pub fn encoded_len(text: &str) -> usize {
    text.chars().map(char_len).sum()
}

fn char_len(ch: char) -> usize {
    match u32::from(ch) {
        0x0001..=0x007F => 1,
        0x0000 | 0x0080..=0x07FF => 2,
        0x0800..=0xFFFF => 3,
        _ => 6,
    }
}

pub fn encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(text));
    encode_into(text, &mut out);
    out
}

/// Appends the encoding of `text` to `out`.
pub fn encode_into(text: &str, out: &mut Vec<u8>) {
    let mut units = [0u16; 2];
    for ch in text.chars() {
        for &unit in ch.encode_utf16(&mut units).iter() {
            push_unit(out, unit);
        }
    }
}

fn push_unit(out: &mut Vec<u8>, unit: u16) {
    match unit {
        0x0001..=0x007F => out.push(unit as u8),
        0x0000 | 0x0080..=0x07FF => {
            out.push(0xC0 | (unit >> 6) as u8);
            out.push(0x80 | (unit & 0x3F) as u8);
        }
        _ => {
            out.push(0xE0 | (unit >> 12) as u8);
            out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
            out.push(0x80 | (unit & 0x3F) as u8);
        }
    }
}

pub fn decode(bytes: &[u8]) -> Result<String, FrameError> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut pos = 0;

    while pos < bytes.len() {
        let lead = bytes[pos];
        let (unit, width) = match lead >> 4 {
            0..=7 => (u16::from(lead), 1),
            12 | 13 => {
                let low = continuation(bytes, pos + 1)?;
                ((u16::from(lead & 0x1F) << 6) | low, 2)
            }
            14 => {
                let mid = continuation(bytes, pos + 1)?;
                let low = continuation(bytes, pos + 2)?;
                ((u16::from(lead & 0x0F) << 12) | (mid << 6) | low, 3)
            }
            _ => {
                return Err(FrameError::Malformed(format!(
                    "invalid lead byte {lead:#04x} at offset {pos}"
                )));
            }
        };
        units.push(unit);
        pos += width;
    }

    String::from_utf16(&units)
        .map_err(|_| FrameError::Malformed("unpaired surrogate in payload".to_string()))
}

fn continuation(bytes: &[u8], pos: usize) -> Result<u16, FrameError> {
    match bytes.get(pos) {
        Some(&byte) if byte & 0xC0 == 0x80 => Ok(u16::from(byte & 0x3F)),
        Some(&byte) => Err(FrameError::Malformed(format!(
            "invalid continuation byte {byte:#04x} at offset {pos}"
        ))),
        None => Err(FrameError::Malformed(
            "payload ends inside a multi-byte sequence".to_string(),
        )),
    }
}
