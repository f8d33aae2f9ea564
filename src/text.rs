//! Utterance splitting and legacy text encoding.
//!
//! The engine accepts at most one generation cycle's worth of text at a
//! time, in the Windows-1252 single-byte encoding it was built against.

use crate::pipeline::messages::SpeechSegment;

/// Maximum characters per generation cycle.
pub const MAX_UNIT_CHARS: usize = 100;

/// Split an utterance into bounded-length segments.
///
/// Pure position-based slicing, no word-boundary awareness; each segment is
/// at most [`MAX_UNIT_CHARS`] characters and slices land on `char`
/// boundaries. The host's `index`, when present, attaches only to the
/// first segment.
pub fn split_units(
    text: &str,
    index: Option<u32>,
) -> impl Iterator<Item = SpeechSegment> + '_ {
    let mut rest = text;
    let mut index = index;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let cut = rest
            .char_indices()
            .nth(MAX_UNIT_CHARS)
            .map_or(rest.len(), |(at, _)| at);
        let (unit, tail) = rest.split_at(cut);
        rest = tail;
        Some(SpeechSegment {
            text: unit.to_owned(),
            index: index.take(),
        })
    })
}

/// Encode text for the engine, replacing what Windows-1252 cannot express.
///
/// The 0x80–0x9F range differs from Latin-1; everything the code page
/// cannot represent becomes `b'?'`. NUL is dropped outright since the
/// engine takes NUL-terminated strings.
pub fn encode_legacy(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\0' => {}
            '\u{01}'..='\u{7f}' => out.push(c as u8),
            '\u{a0}'..='\u{ff}' => out.push(c as u8),
            _ => out.push(cp1252_special(c).unwrap_or(b'?')),
        }
    }
    out
}

/// The Windows-1252 characters occupying the 0x80–0x9F block.
fn cp1252_special(c: char) -> Option<u8> {
    let byte = match c {
        '\u{20ac}' => 0x80, // €
        '\u{201a}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201e}' => 0x84,
        '\u{2026}' => 0x85, // …
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02c6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8a,
        '\u{2039}' => 0x8b,
        '\u{0152}' => 0x8c,
        '\u{017d}' => 0x8e,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93, // “
        '\u{201d}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02dc}' => 0x98,
        '\u{2122}' => 0x99, // ™
        '\u{0161}' => 0x9a,
        '\u{203a}' => 0x9b,
        '\u{0153}' => 0x9c,
        '\u{017e}' => 0x9e,
        '\u{0178}' => 0x9f,
        _ => return None,
    };
    Some(byte)
}
