//! A fixed-capacity, bit-granular buffer serializer/deserializer.
//!
//! Values are packed contiguously into a preallocated array of 64-bit
//! segments with no padding between fields (unless [`BitBufferWriter::pad_to_byte`]
//! is called explicitly). A buffer is built write-side only; calling
//! [`BitBufferWriter::freeze`] consumes the writer and produces an
//! immutable [`BitBuffer`] that any number of independent [`ReadCursor`]s
//! may traverse, including concurrently from multiple threads.
//!
//! ```
//! use b89_bitbuf::bitbuf::BitBufferWriter;
//!
//! let mut w = BitBufferWriter::alloc(64);
//! w.write_bool(true).unwrap();
//! w.pad_to_byte().unwrap();
//! w.write_i32(-500_000).unwrap();
//! let buf = w.freeze();
//!
//! let mut cursor = buf.cursor();
//! assert_eq!(cursor.read_bool().unwrap(), true);
//! cursor.skip_byte_padding();
//! assert_eq!(cursor.read_i32().unwrap(), -500_000);
//! ```
//!
//! There is deliberately no resize path: a writer that runs out of room
//! sets its sticky `truncated` flag (queryable with
//! [`BitBufferWriter::has_truncated`]) rather than growing the buffer.

mod read;
mod segment;
mod write;

pub use read::{BitBuffer, ReadCursor, ReadPastEnd};
pub use write::{BitBufferWriter, Truncated, WrapError};
