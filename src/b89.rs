//! Codec for _Printable Base-89 LUT_ codes embedded in otherwise-plain text.
//!
//! A code is a fixed 4-byte escape sequence `0x03 d0 d1 d2`, where each digit
//! byte lies in `0x26..=0x7E` and together they encode an integer index in
//! `0..=704968`. [`Tokenizer`] scans a byte slice and yields alternating
//! [`Event::Text`] and [`Event::Code`] items, finding the escape byte with an
//! 8-byte-at-a-time SWAR probe rather than a byte-by-byte loop.
//!
//! ```
//! # use b89_bitbuf::b89::{self, Event};
//! let mut buf = [0u8; 4];
//! b89::pack(192, &mut buf);
//! assert_eq!(b89::unpack(&buf, 1000), 192);
//!
//! let text = b"Hello, \x03\x28\x26\x26guy\x03\x27\x26\x26";
//! let mut events = b89::Tokenizer::new(text, 10_000);
//! assert!(matches!(events.next(), Some(Event::Text(b"Hello, "))));
//! assert!(matches!(events.next(), Some(Event::Code(_))));
//! assert!(matches!(events.next(), Some(Event::Text(b"guy"))));
//! assert!(matches!(events.next(), Some(Event::Code(_))));
//! assert_eq!(events.next(), None);
//! ```

use log::trace;

/// The escape byte leading every code.
pub const ST: u8 = 0x03;

/// Low end of the printable digit alphabet (inclusive).
const ORD_MIN: u32 = 38;
/// High end of the printable digit alphabet (inclusive).
const ORD_MAX: u32 = 126;
/// Size of the digit alphabet; `ORD_MAX - ORD_MIN + 1`.
const BASE: u32 = ORD_MAX - ORD_MIN + 1;

/// Reserved index returned on any decode failure.
pub const ERROR_INDEX: u32 = 0;

/// Largest index representable in three base-89 digits (`89^3 - 1`).
pub const CODE_MAX: u32 = BASE * BASE * BASE - 1;

/// One item produced by [`Tokenizer`]: either a run of plain text, or a
/// decoded code.
///
/// A `Code`'s index is [`ERROR_INDEX`] (`0`) when the 4-byte sequence was
/// malformed or exceeded the tokenizer's `max_index` — see
/// [`Tokenizer::new`]. `0` is never a valid code, so callers can treat it as
/// reserved without inspecting any other field.
#[derive(Debug, PartialEq, Eq)]
pub enum Event<'a> {
    /// A maximal run of bytes not containing [`ST`]. Never empty.
    Text(&'a [u8]),
    /// A decoded 4-byte code; `0` means the code was malformed or out of range.
    Code(u32),
}

/// Packs `index` into the 4-byte wire form `ST d0 d1 d2`.
///
/// # Panics
///
/// Panics in debug builds if `index > CODE_MAX`; in release builds the
/// upper digit silently wraps.
pub fn pack(index: u32, out: &mut [u8; 4]) {
    debug_assert!(index <= CODE_MAX, "b89 index {} exceeds CODE_MAX", index);

    let mut rest = index;
    let d0 = rest % BASE;
    rest /= BASE;
    let d1 = rest % BASE;
    rest /= BASE;
    let d2 = rest % BASE;

    out[0] = ST;
    out[1] = (ORD_MIN + d0) as u8;
    out[2] = (ORD_MIN + d1) as u8;
    out[3] = (ORD_MIN + d2) as u8;
}

/// Decodes a candidate 4-byte code, returning [`ERROR_INDEX`] on any failure:
/// a leader byte other than [`ST`], a digit outside `0x26..=0x7E`, or a
/// decoded value exceeding `max_index`.
pub fn unpack(bytes: &[u8; 4], max_index: u32) -> u32 {
    decode(bytes, max_index)
}

fn decode(bytes: &[u8; 4], max_index: u32) -> u32 {
    let st = bytes[0] as u32;
    let c1 = bytes[1] as u32;
    let c2 = bytes[2] as u32;
    let c3 = bytes[3] as u32;

    if st != ST as u32
        || !(ORD_MIN..=ORD_MAX).contains(&c1)
        || !(ORD_MIN..=ORD_MAX).contains(&c2)
        || !(ORD_MIN..=ORD_MAX).contains(&c3)
    {
        trace!("b89: malformed code bytes {:?}", bytes);
        return ERROR_INDEX;
    }

    let d0 = c1 - ORD_MIN;
    let d1 = c2 - ORD_MIN;
    let d2 = c3 - ORD_MIN;

    // Horner's rule, most-significant digit first: d2, then d1, then d0.
    let index = (d2 * BASE + d1) * BASE + d0;

    if index <= max_index {
        index
    } else {
        trace!("b89: index {} exceeds max_index {}", index, max_index);
        ERROR_INDEX
    }
}

/// Finds the offset of the first [`ST`] byte in `haystack`, or `haystack.len()`
/// if there is none.
///
/// Scans 8 bytes at a time using the classic SWAR "has-zero-byte" trick:
/// XOR against a word of repeated `ST` bytes turns any escape byte into a
/// zero byte, and the zero-byte test below identifies it without a
/// byte-wise branch in the common (no-match) case.
fn scan_for_st(haystack: &[u8]) -> usize {
    const ST_WORD: u64 = 0x0303_0303_0303_0303;
    const LO: u64 = 0x0101_0101_0101_0101;
    const HI: u64 = 0x8080_8080_8080_8080;

    let mut i = 0;
    while i + 8 <= haystack.len() {
        let word = u64::from_ne_bytes(haystack[i..i + 8].try_into().unwrap());
        let diff = word ^ ST_WORD;
        let has_match = diff.wrapping_sub(LO) & !diff & HI;
        if has_match != 0 {
            // `trailing_zeros` locates the lowest set bit; dividing by 8
            // converts bit offset to byte offset. This is correct
            // regardless of host endianness because `from_ne_bytes`
            // round-trips the byte layout we indexed from.
            return i + (has_match.trailing_zeros() / 8) as usize;
        }
        i += 8;
    }

    while i < haystack.len() {
        if haystack[i] == ST {
            return i;
        }
        i += 1;
    }

    haystack.len()
}

/// Streaming tokenizer splitting a byte slice into [`Event::Text`] and
/// [`Event::Code`] items.
///
/// The tokenizer borrows its input; it never allocates. A trailing `ST` byte
/// with fewer than 3 digit bytes following it ends iteration silently — no
/// final `Code(0)` event is emitted for it, matching the reference
/// implementation exactly (this is a documented contract, not an omission;
/// see the spec's Open Questions).
pub struct Tokenizer<'a> {
    bytes: &'a [u8],
    pos: usize,
    max_index: u32,
}

impl<'a> Tokenizer<'a> {
    /// Begins tokenizing `bytes`. Decoded code indices above `max_index` are
    /// reported as [`ERROR_INDEX`].
    pub fn new(bytes: &'a [u8], max_index: u32) -> Self {
        Tokenizer {
            bytes,
            pos: 0,
            max_index,
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Event<'a>> {
        if self.pos == self.bytes.len() {
            return None;
        }

        let start = self.pos;
        let found = scan_for_st(&self.bytes[self.pos..]);
        self.pos += found;

        if self.pos > start {
            return Some(Event::Text(&self.bytes[start..self.pos]));
        }

        // self.bytes[self.pos] == ST
        if self.bytes.len() - self.pos < 4 {
            trace!("b89: truncated trailing code, ending iteration");
            self.pos = self.bytes.len();
            return None;
        }

        let code_bytes: [u8; 4] = self.bytes[self.pos..self.pos + 4].try_into().unwrap();
        let index = decode(&code_bytes, self.max_index);
        self.pos += 4;
        Some(Event::Code(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_s1() {
        // d0 = 192 % 89 = 14 -> 0x26+14 = 0x34
        // d1 = (192 / 89) % 89 = 2 -> 0x26+2 = 0x28
        // d2 = 192 / 89 / 89 = 0 -> 0x26+0 = 0x26
        let mut out = [0u8; 4];
        pack(192, &mut out);
        assert_eq!(out, [0x03, 0x34, 0x28, 0x26]);
        assert_eq!(unpack(&out, 1000), 192);
    }

    #[test]
    fn round_trip_every_index() {
        for i in 0..=CODE_MAX {
            let mut out = [0u8; 4];
            pack(i, &mut out);
            assert_eq!(unpack(&out, CODE_MAX), i, "index {} failed round trip", i);
        }
    }

    #[test]
    fn round_trip_spot_checks_with_slack_ceiling() {
        for &i in &[0u32, 1, 88, 89, 704968] {
            let mut out = [0u8; 4];
            pack(i, &mut out);
            assert_eq!(unpack(&out, i + 1000), i);
        }
    }

    #[test]
    fn bad_leader_byte_is_error_index() {
        for leader in 0u8..=255 {
            if leader == ST {
                continue;
            }
            let bytes = [leader, 0x26, 0x26, 0x26];
            assert_eq!(unpack(&bytes, CODE_MAX), ERROR_INDEX);
        }
    }

    #[test]
    fn digit_out_of_alphabet_is_error_index() {
        for &bad in &[0x00u8, 0x25, 0x7F, 0xFF] {
            assert_eq!(unpack(&[ST, bad, 0x26, 0x26], CODE_MAX), ERROR_INDEX);
            assert_eq!(unpack(&[ST, 0x26, bad, 0x26], CODE_MAX), ERROR_INDEX);
            assert_eq!(unpack(&[ST, 0x26, 0x26, bad], CODE_MAX), ERROR_INDEX);
        }
    }

    #[test]
    fn max_index_gate() {
        let mut out = [0u8; 4];
        pack(500, &mut out);
        assert_eq!(unpack(&out, 499), ERROR_INDEX);
        assert_eq!(unpack(&out, 500), 500);
    }

    #[test]
    fn tokenize_text_and_codes() {
        let text = b"Hello, \x03\x28\x26\x26guy\x03\x27\x26\x26";
        let mut it = Tokenizer::new(text, 10_000);

        assert_eq!(it.next(), Some(Event::Text(&text[0..7])));
        match it.next() {
            Some(Event::Code(index)) => assert!(index > 0),
            other => panic!("expected code event, got {:?}", other),
        }
        assert_eq!(it.next(), Some(Event::Text(b"guy")));
        match it.next() {
            Some(Event::Code(index)) => assert!(index > 0),
            other => panic!("expected code event, got {:?}", other),
        }
        assert_eq!(it.next(), None);
    }

    #[test]
    fn empty_input_yields_no_events() {
        let mut it = Tokenizer::new(b"", 10);
        assert_eq!(it.next(), None);
    }

    #[test]
    fn plain_text_with_no_codes() {
        let mut it = Tokenizer::new(b"just plain text", 10);
        assert_eq!(it.next(), Some(Event::Text(b"just plain text")));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn truncated_trailing_code_ends_iteration_silently() {
        // Only 3 bytes after a text span, not the 4 required for a code.
        let mut it = Tokenizer::new(b"abc\x03\x26\x26", 10);
        assert_eq!(it.next(), Some(Event::Text(b"abc")));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn lone_st_at_end_ends_iteration_silently() {
        let mut it = Tokenizer::new(b"abc\x03", 10);
        assert_eq!(it.next(), Some(Event::Text(b"abc")));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn malformed_code_in_stream_still_advances_four_bytes() {
        // Bad digit byte inside an otherwise 4-byte code: the tokenizer
        // still treats it as a (malformed) code and advances past it,
        // rather than re-scanning from the second byte.
        let text = b"\x03\x00\x26\x26next";
        let mut it = Tokenizer::new(text, 10_000);
        assert_eq!(it.next(), Some(Event::Code(ERROR_INDEX)));
        assert_eq!(it.next(), Some(Event::Text(b"next")));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn scan_boundary_across_eight_byte_chunks() {
        // Escape byte positioned at every offset 0..16 to exercise both
        // the SWAR fast path and the tail loop.
        for offset in 0..16usize {
            let mut data = vec![b'x'; 16];
            data[offset] = ST;
            // Ensure there are 3 valid digit bytes after it when possible;
            // otherwise expect truncated-iteration behavior.
            if offset + 4 <= data.len() {
                data[offset + 1] = 0x26;
                data[offset + 2] = 0x26;
                data[offset + 3] = 0x26;
            } else {
                data.truncate(offset + 1);
            }

            let mut it = Tokenizer::new(&data, 10_000);
            if offset > 0 {
                assert_eq!(it.next(), Some(Event::Text(&data[0..offset])));
            }
            if offset + 4 <= 16 {
                assert_eq!(it.next(), Some(Event::Code(0)));
            } else {
                assert_eq!(it.next(), None);
            }
        }
    }
}
