//! Write side of BITBUF: a fixed-capacity, non-resizable bit-granular
//! serializer.

use std::fmt;

use log::trace;

use super::read::BitBuffer;
use super::segment::{self, mask, Position};

/// Returned by any write operation that would exceed the buffer's capacity.
/// The offending write does not partially commit; [`BitBufferWriter::has_truncated`]
/// remains set (sticky) until the caller clears it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncated;

impl fmt::Display for Truncated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "write exceeded BITBUF capacity")
    }
}

impl std::error::Error for Truncated {}

/// Returned by [`BitBufferWriter::wrap`] when the supplied byte slice's
/// length is not a multiple of 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapError {
    pub len: usize,
}

impl fmt::Display for WrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot wrap {} bytes: length is not a multiple of 8",
            self.len
        )
    }
}

impl std::error::Error for WrapError {}

/// Backing storage for a [`BitBufferWriter`]: either an owned, heap-allocated
/// byte buffer, or a caller-provided byte slice the writer borrows for its
/// lifetime. Kept as bytes (rather than a `[u64]` segment array) so that
/// [`BitBuffer::get_bytes`](super::read::BitBuffer::get_bytes) can hand back
/// a real `&[u8]` into the buffer's own storage instead of copying it out.
enum Storage<'a> {
    Owned(Box<[u8]>),
    Borrowed(&'a mut [u8]),
}

impl<'a> Storage<'a> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(b) => b,
            Storage::Borrowed(s) => s,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Storage::Owned(b) => b,
            Storage::Borrowed(s) => s,
        }
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// ORs `bits` into the 64-bit segment at `idx` (the 8-byte window
    /// `[idx*8, idx*8+8)`), read and written in host byte order.
    fn or_into_segment(&mut self, idx: usize, bits: u64) {
        let start = idx * 8;
        let window: &mut [u8; 8] = (&mut self.as_mut_slice()[start..start + 8])
            .try_into()
            .unwrap();
        let current = u64::from_ne_bytes(*window);
        *window = (current | bits).to_ne_bytes();
    }
}

/// A writable, fixed-capacity bit stream.
///
/// Built by [`alloc`](BitBufferWriter::alloc), [`alloc_with_copy`](BitBufferWriter::alloc_with_copy),
/// or [`wrap`](BitBufferWriter::wrap); consumed by [`freeze`](BitBufferWriter::freeze)
/// into a read-only [`BitBuffer`]. There is no runtime "already frozen" guard
/// — once `freeze` is called the writer no longer exists, so further writes
/// are a compile error rather than a programming-error assertion.
pub struct BitBufferWriter<'a> {
    storage: Option<Storage<'a>>,
    pos: Position,
    truncated: bool,
}

impl<'a> BitBufferWriter<'a> {
    /// Allocates a zero-filled buffer of at least `capacity_bytes` bytes,
    /// rounded up to a multiple of 8.
    pub fn alloc(capacity_bytes: usize) -> Self {
        let rounded_bytes = (capacity_bytes + 7) / 8 * 8;
        BitBufferWriter {
            storage: Some(Storage::Owned(vec![0u8; rounded_bytes].into_boxed_slice())),
            pos: Position::start(),
            truncated: false,
        }
    }

    /// Allocates a buffer sized to hold at least `bytes.len()` bytes
    /// (rounded up to a multiple of 8), copies `bytes` in, and positions the
    /// write cursor immediately after the copied data so further writes
    /// append.
    pub fn alloc_with_copy(bytes: &[u8]) -> Self {
        let mut writer = BitBufferWriter::alloc(bytes.len());
        for &b in bytes {
            // Capacity was sized for exactly these bytes; this cannot truncate.
            writer.write_u8(b).expect("alloc_with_copy capacity covers its own bytes");
        }
        writer
    }

    /// Wraps an existing byte slice as borrowed storage. `bytes.len()` must
    /// be a multiple of 8, or this returns [`WrapError`]. The writer never
    /// frees this memory; ownership remains with the caller for the
    /// borrow's duration.
    pub fn wrap(bytes: &'a mut [u8]) -> Result<Self, WrapError> {
        if bytes.len() % 8 != 0 {
            return Err(WrapError { len: bytes.len() });
        }
        Ok(BitBufferWriter {
            storage: Some(Storage::Borrowed(bytes)),
            pos: Position::start(),
            truncated: false,
        })
    }

    fn capacity_bits(&self) -> u64 {
        self.storage.as_ref().expect("storage taken").len() as u64 * 8
    }

    /// True once a write has overflowed capacity; stays true until
    /// [`clear_truncated`](Self::clear_truncated) is called.
    pub fn has_truncated(&self) -> bool {
        self.truncated
    }

    /// Clears the sticky truncation flag. Intended for callers who expect
    /// truncation in a given call sequence and want to suppress the
    /// debug-mode drop assertion.
    pub fn clear_truncated(&mut self) {
        self.truncated = false;
    }

    /// Bit-packs `datum`'s low `n` bits (`n` in `0..=64`) into the stream.
    /// `n > 64` is a defensive no-op.
    pub fn write_bits(&mut self, datum: u64, n: u32) -> Result<(), Truncated> {
        if n > 64 || n == 0 {
            return Ok(());
        }

        let remaining = segment::remaining_bits_write(self.pos, self.capacity_bits());
        if remaining < n as u64 {
            self.truncated = true;
            trace!(
                "bitbuf: write of {} bits truncated, {} bits remaining",
                n,
                remaining
            );
            return Err(Truncated);
        }

        self.write_bits_unchecked(datum, n);
        Ok(())
    }

    fn write_bits_unchecked(&mut self, mut datum: u64, mut n: u32) {
        loop {
            let r = self.pos.room_in_segment();
            let bits = self.pos.bits_into_seg;
            let idx = self.pos.seg;
            let this_n = n.min(r);

            self.storage
                .as_mut()
                .expect("storage taken")
                .or_into_segment(idx, (datum & mask(this_n)) << bits);
            self.pos.advance(this_n);

            if n <= r {
                return;
            }

            datum >>= r;
            n -= r;
        }
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), Truncated> {
        self.write_bits(value as u64, 8)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), Truncated> {
        self.write_bits(value as u64, 16)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), Truncated> {
        self.write_bits(value as u64, 32)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), Truncated> {
        self.write_bits(value, 64)
    }

    pub fn write_i8(&mut self, value: i8) -> Result<(), Truncated> {
        self.write_bits(value as u64, 8)
    }

    pub fn write_i16(&mut self, value: i16) -> Result<(), Truncated> {
        self.write_bits(value as u64, 16)
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), Truncated> {
        self.write_bits(value as u64, 32)
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), Truncated> {
        self.write_bits(value as u64, 64)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), Truncated> {
        self.write_bits(value.to_bits() as u64, 32)
    }

    pub fn write_f64(&mut self, value: f64) -> Result<(), Truncated> {
        self.write_bits(value.to_bits(), 64)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), Truncated> {
        self.write_bits(value as u64, 1)
    }

    /// Writes each byte of `s` followed by a terminating `0x00`. `s` itself
    /// must not contain a NUL byte; strings are not length-prefixed.
    pub fn write_cstr(&mut self, s: &[u8]) -> Result<(), Truncated> {
        debug_assert!(!s.contains(&0), "write_cstr: embedded NUL in string body");
        for &b in s {
            self.write_u8(b)?;
        }
        self.write_u8(0)
    }

    /// Writes the low `n` bits of `value` (`n` in `0..=64`).
    ///
    /// `value` must have no set bits above bit `n - 1`; this is checked
    /// with `debug_assert!` only; a release build does not mask `value`
    /// and will leak its high bits into the following field, matching the
    /// documented caller contract.
    pub fn write_n_bits(&mut self, n: u32, value: u64) -> Result<(), Truncated> {
        debug_assert!(
            n > 64 || value & !mask(n) == 0,
            "write_n_bits: value {:#x} has bits set above field width {}",
            value,
            n
        );
        self.write_bits(value, n)
    }

    /// Pads with zero bits up to the next byte boundary. A no-op when
    /// already byte-aligned.
    pub fn pad_to_byte(&mut self) -> Result<(), Truncated> {
        let k = (8 - (self.pos.bits_into_seg % 8)) % 8;
        if k == 0 {
            return Ok(());
        }
        self.write_bits(0, k)
    }

    /// Quantizes `value` from `[min, max]` into `n` bits (`1..=31`) and
    /// writes the result. `min < max` and `min <= value <= max` are
    /// precondition asserts, not recoverable errors.
    pub fn write_quantized_float(
        &mut self,
        n: u32,
        min: f32,
        max: f32,
        value: f32,
    ) -> Result<(), Truncated> {
        debug_assert!((1..=31).contains(&n), "write_quantized_float: n out of range");
        debug_assert!(min < max, "write_quantized_float: min must be < max");
        debug_assert!(
            value >= min && value <= max,
            "write_quantized_float: value out of [min, max]"
        );

        let bit_max = mask(n) as u32;
        let qf = ((value - min) * bit_max as f32 / (max - min)).clamp(0.0, bit_max as f32);
        let mut qi = qf.floor() as u32;

        // Floating-point rounding can produce a value with only the bit
        // just above the N-bit field set, which mask(n) would otherwise
        // silently drop; clamp that case up to full saturation instead.
        if qi != 0 && (qi & bit_max) == 0 {
            qi = bit_max;
        }

        self.write_n_bits(n, qi as u64)
    }

    /// Consumes the writer, producing an immutable, shareable [`BitBuffer`].
    /// No further writes are possible — the writer no longer exists.
    pub fn freeze(mut self) -> BitBuffer<'a> {
        let storage = self.storage.take().expect("storage taken exactly once");
        let used_bytes = self.pos.seg * 8 + ((self.pos.bits_into_seg as usize + 7) / 8);
        let truncated = self.truncated;
        BitBuffer::from_writer_parts(storage.into_frozen(), used_bytes, truncated)
    }
}

impl<'a> Storage<'a> {
    fn into_frozen(self) -> super::read::FrozenStorage<'a> {
        match self {
            Storage::Owned(b) => super::read::FrozenStorage::Owned(b),
            Storage::Borrowed(s) => super::read::FrozenStorage::Borrowed(s),
        }
    }
}

impl<'a> Drop for BitBufferWriter<'a> {
    fn drop(&mut self) {
        if self.storage.is_some() {
            debug_assert!(
                !self.truncated,
                "BitBufferWriter dropped with truncated set; call clear_truncated() if expected"
            );
        }
    }
}
