//! Two small, independent codecs:
//!
//! - [`b89`]: a printable escape-sequence text codec, for embedding integer
//!   codes inside otherwise-plain byte strings.
//! - [`bitbuf`]: a fixed-capacity, bit-granular buffer serializer/deserializer.
//!
//! Neither module depends on the other.

pub mod b89;
pub mod bitbuf;
