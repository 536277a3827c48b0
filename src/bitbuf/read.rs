//! Read side of BITBUF: an immutable, frozen bit stream and independent
//! read cursors over it.

use std::fmt;

use log::trace;

use super::segment::{self, mask, Position};

/// Returned when a read would run past the buffer's capacity. The call
/// returns as if it read all zero bits; [`ReadCursor::has_read_past_end`]
/// stays sticky until the caller notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPastEnd;

impl fmt::Display for ReadPastEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "read past end of BITBUF")
    }
}

impl std::error::Error for ReadPastEnd {}

/// Backing storage for a frozen [`BitBuffer`]. Mirrors the writer's
/// `Storage` enum but holds a shared rather than exclusive reference in the
/// borrowed case — produced only by [`BitBufferWriter::freeze`](super::write::BitBufferWriter::freeze).
/// Kept as bytes (rather than a `[u64]` segment array) so [`BitBuffer::get_bytes`]
/// can hand back a real `&[u8]` borrow instead of a fresh copy.
pub(super) enum FrozenStorage<'a> {
    Owned(Box<[u8]>),
    Borrowed(&'a [u8]),
}

impl<'a> FrozenStorage<'a> {
    fn as_slice(&self) -> &[u8] {
        match self {
            FrozenStorage::Owned(b) => b,
            FrozenStorage::Borrowed(s) => s,
        }
    }

    /// Reads the 64-bit segment at `idx` (the 8-byte window `[idx*8, idx*8+8)`)
    /// in host byte order.
    fn segment_at(&self, idx: usize) -> u64 {
        let start = idx * 8;
        let window: [u8; 8] = self.as_slice()[start..start + 8].try_into().unwrap();
        u64::from_ne_bytes(window)
    }
}

/// An immutable, fixed-capacity bit stream produced by freezing a
/// [`BitBufferWriter`](super::write::BitBufferWriter).
///
/// `BitBuffer` holds only plain data (bytes) behind either an owned
/// allocation or a borrow, with no interior mutability, so it is naturally
/// `Sync`: any number of [`ReadCursor`]s, including ones held by different
/// threads, may traverse it concurrently without synchronization.
pub struct BitBuffer<'a> {
    storage: FrozenStorage<'a>,
    used_bytes: usize,
    truncated: bool,
}

impl<'a> BitBuffer<'a> {
    pub(super) fn from_writer_parts(
        storage: FrozenStorage<'a>,
        used_bytes: usize,
        truncated: bool,
    ) -> Self {
        BitBuffer {
            storage,
            used_bytes,
            truncated,
        }
    }

    fn segment_count(&self) -> usize {
        self.storage.as_slice().len() / 8
    }

    /// Whether the writer that produced this buffer ever set its sticky
    /// truncation flag.
    pub fn has_truncated(&self) -> bool {
        self.truncated
    }

    /// Returns a fresh, independent cursor positioned at the start of the
    /// stream. Any number of cursors may coexist and read concurrently.
    pub fn cursor(&self) -> ReadCursor<'_> {
        ReadCursor {
            buffer: self,
            pos: Position::start(),
            read_past_end: false,
        }
    }

    /// Borrows the bytes actually written (host byte order), i.e. everything
    /// up to and including the last partial segment touched by the write
    /// cursor at freeze time. This is a real `&[u8]` into the buffer's own
    /// storage — no copy is made.
    pub fn get_bytes(&self) -> &[u8] {
        &self.storage.as_slice()[..self.used_bytes]
    }
}

// `BitBuffer` contains only `Box<[u8]>` or `&[u8]`, both `Sync`; no
// unsafe impl is needed, this is automatic. Documented here because the
// concurrent-multi-reader model is a load-bearing property of the type.

/// An independent read position over a frozen [`BitBuffer`]. Cheap to
/// create; many cursors may coexist over one buffer, each observing the
/// same sequence of written values regardless of what other cursors have
/// read.
pub struct ReadCursor<'a> {
    buffer: &'a BitBuffer<'a>,
    pos: Position,
    read_past_end: bool,
}

impl<'a> ReadCursor<'a> {
    /// True once a read has run past the buffer's capacity; stays true
    /// until the cursor is discarded (there is no clear method — a cursor
    /// that has overrun should be replaced, not trusted further).
    pub fn has_read_past_end(&self) -> bool {
        self.read_past_end
    }

    /// Reads `n` bits (`n` in `0..=64`) and returns them right-aligned.
    /// `n > 64` is a defensive no-op returning `0`.
    pub fn read_bits(&mut self, n: u32) -> Result<u64, ReadPastEnd> {
        if n > 64 || n == 0 {
            return Ok(0);
        }

        let remaining = segment::remaining_bits_read(self.pos, self.buffer.segment_count());
        if remaining < n as u64 {
            self.read_past_end = true;
            trace!(
                "bitbuf: read of {} bits past end, {} bits remaining",
                n,
                remaining
            );
            return Err(ReadPastEnd);
        }

        Ok(self.read_bits_unchecked(n))
    }

    fn read_bits_unchecked(&mut self, n: u32) -> u64 {
        let r = self.pos.room_in_segment();
        let bits = self.pos.bits_into_seg;
        let idx = self.pos.seg;
        let seg_val = self.buffer.storage.segment_at(idx);

        if n <= r {
            let val = (seg_val & (mask(n) << bits)) >> bits;
            self.pos.advance(n);
            val
        } else {
            let low = seg_val >> bits;
            self.pos.advance(r);
            let rest = self.read_bits_unchecked(n - r);
            low | (rest << r)
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadPastEnd> {
        self.read_bits(8).map(|v| v as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, ReadPastEnd> {
        self.read_bits(16).map(|v| v as u16)
    }

    pub fn read_u32(&mut self) -> Result<u32, ReadPastEnd> {
        self.read_bits(32).map(|v| v as u32)
    }

    pub fn read_u64(&mut self) -> Result<u64, ReadPastEnd> {
        self.read_bits(64)
    }

    pub fn read_i8(&mut self) -> Result<i8, ReadPastEnd> {
        self.read_bits(8).map(|v| v as u8 as i8)
    }

    pub fn read_i16(&mut self) -> Result<i16, ReadPastEnd> {
        self.read_bits(16).map(|v| v as u16 as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32, ReadPastEnd> {
        self.read_bits(32).map(|v| v as u32 as i32)
    }

    pub fn read_i64(&mut self) -> Result<i64, ReadPastEnd> {
        self.read_bits(64).map(|v| v as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32, ReadPastEnd> {
        self.read_bits(32).map(|v| f32::from_bits(v as u32))
    }

    pub fn read_f64(&mut self) -> Result<f64, ReadPastEnd> {
        self.read_bits(64).map(f64::from_bits)
    }

    pub fn read_bool(&mut self) -> Result<bool, ReadPastEnd> {
        self.read_bits(1).map(|v| v != 0)
    }

    /// Reads up to `max_bytes` bytes, stopping at (and consuming) a `0x00`
    /// terminator. If `max_bytes` is exhausted without seeing a NUL, the
    /// cursor is left where it stopped (not rewound) and an empty `Vec` is
    /// returned.
    pub fn read_cstr(&mut self, max_bytes: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for _ in 0..max_bytes {
            let byte = match self.read_u8() {
                Ok(b) => b,
                Err(_) => return Vec::new(),
            };
            if byte == 0 {
                return out;
            }
            out.push(byte);
        }
        Vec::new()
    }

    /// Reads `n` bits (`n` in `0..=64`) and also returns `mask(n)`, the
    /// value's bit-width mask. A failed read is distinguishable from a
    /// successful read of `0` via the `Err` variant — do not rely on the
    /// mask to detect failure. `n > 64` is a defensive no-op returning
    /// `(0, 0)`, matching [`read_bits`](Self::read_bits)'s own handling —
    /// `mask` only covers `0..=64` and must not be indexed with a wider `n`.
    pub fn read_n_bits(&mut self, n: u32) -> Result<(u64, u64), ReadPastEnd> {
        if n > 64 {
            return Ok((0, 0));
        }
        let value = self.read_bits(n)?;
        Ok((value, mask(n)))
    }

    /// Advances to the next byte boundary without reading; a no-op when
    /// already aligned.
    pub fn skip_byte_padding(&mut self) {
        let k = (8 - (self.pos.bits_into_seg % 8)) % 8;
        self.pos.advance(k);
    }

    /// Reads an `n`-bit (`1..=31`) quantized value and maps it back into
    /// `[min, max]`. Boundary values (`min`, `max`) round-trip exactly.
    pub fn read_quantized_float(&mut self, n: u32, min: f32, max: f32) -> Result<f32, ReadPastEnd> {
        debug_assert!((1..=31).contains(&n), "read_quantized_float: n out of range");
        debug_assert!(min < max, "read_quantized_float: min must be < max");

        let (qi, bit_mask) = self.read_n_bits(n)?;
        Ok(min + (qi as f32 / bit_mask as f32) * (max - min))
    }
}

#[cfg(test)]
mod tests {
    use super::super::write::BitBufferWriter;

    #[test]
    fn basic_round_trip_scenario() {
        let mut w = BitBufferWriter::alloc(256);
        w.write_bool(true).unwrap();
        w.pad_to_byte().unwrap();
        w.write_i64(-32).unwrap();
        w.write_cstr(b"hello, world").unwrap();
        w.write_f32(-325.32).unwrap();
        w.write_n_bits(4, 13).unwrap();
        w.pad_to_byte().unwrap();
        w.write_n_bits(7, 121).unwrap();
        let buf = w.freeze();

        let mut r = buf.cursor();
        assert_eq!(r.read_bool().unwrap(), true);
        r.skip_byte_padding();
        assert_eq!(r.read_i64().unwrap(), -32);
        assert_eq!(r.read_cstr(64), b"hello, world".to_vec());
        assert_eq!(r.read_f32().unwrap(), -325.32);
        let (v, m) = r.read_n_bits(4).unwrap();
        assert_eq!(v, 13);
        assert_eq!(m, 15);
        r.skip_byte_padding();
        let (v, _) = r.read_n_bits(7).unwrap();
        assert_eq!(v, 121);
    }

    #[test]
    fn n_bit_round_trip_all_widths() {
        for n in 1u32..=64 {
            let m = super::mask(n);
            for &v in &[0u64, 1, m / 2, m] {
                let mut w = BitBufferWriter::alloc(16);
                w.write_n_bits(n, v).unwrap();
                let buf = w.freeze();
                let mut r = buf.cursor();
                let (got, got_mask) = r.read_n_bits(n).unwrap();
                assert_eq!(got, v, "n={} v={}", n, v);
                assert_eq!(got_mask, m);
            }
        }
    }

    #[test]
    fn quantized_boundaries_exact() {
        for n in [4u32, 8, 16, 24, 31] {
            for (min, max) in [(0.0f32, 1.0f32), (-1.0, 0.0), (-1.0, 1.0), (-32000.0, 32000.0)] {
                let mut w = BitBufferWriter::alloc(64);
                w.write_quantized_float(n, min, max, min).unwrap();
                w.write_quantized_float(n, min, max, max).unwrap();
                let buf = w.freeze();
                let mut r = buf.cursor();
                assert_eq!(r.read_quantized_float(n, min, max).unwrap(), min);
                assert_eq!(r.read_quantized_float(n, min, max).unwrap(), max);
            }
        }
    }

    #[test]
    fn read_past_end_is_sticky_and_zero() {
        let w = BitBufferWriter::alloc(1); // 64 bits, all zero
        let buf = w.freeze();
        let mut r = buf.cursor();
        assert_eq!(r.read_u64().unwrap(), 0);
        assert!(r.read_u64().is_err());
        assert!(r.has_read_past_end());
        // subsequent reads keep failing
        assert!(r.read_bits(1).is_err());
        assert!(r.has_read_past_end());
    }

    #[test]
    fn multiple_cursors_are_independent() {
        let mut w = BitBufferWriter::alloc(32);
        w.write_u32(111).unwrap();
        w.write_u32(222).unwrap();
        let buf = w.freeze();

        let mut a = buf.cursor();
        let mut b = buf.cursor();
        assert_eq!(a.read_u32().unwrap(), 111);
        assert_eq!(b.read_u32().unwrap(), 111);
        assert_eq!(b.read_u32().unwrap(), 222);
        assert_eq!(a.read_u32().unwrap(), 222);
    }

    #[test]
    fn cstr_overflow_without_nul_clears_to_empty() {
        let mut w = BitBufferWriter::alloc(16);
        for _ in 0..8 {
            w.write_u8(b'x').unwrap();
        }
        let buf = w.freeze();
        let mut r = buf.cursor();
        assert_eq!(r.read_cstr(4), Vec::<u8>::new());
    }

    #[test]
    fn get_bytes_reflects_used_length_only() {
        let mut w = BitBufferWriter::alloc(256);
        w.write_u32(0xdead_beef).unwrap();
        let buf = w.freeze();
        assert_eq!(buf.get_bytes().len(), 4);
    }

    #[test]
    fn get_bytes_is_a_borrow_not_a_copy() {
        let mut w = BitBufferWriter::alloc(256);
        w.write_u32(0xdead_beef).unwrap();
        let buf = w.freeze();
        // Two calls return slices over the same backing storage.
        assert_eq!(buf.get_bytes().as_ptr(), buf.get_bytes().as_ptr());
    }

    #[test]
    fn read_n_bits_out_of_range_is_a_no_op_not_a_panic() {
        let w = BitBufferWriter::alloc(16);
        let buf = w.freeze();
        let mut r = buf.cursor();
        assert_eq!(r.read_n_bits(65).unwrap(), (0, 0));
        assert!(!r.has_read_past_end());
    }
}
