//! Marshaling between AMQP values and bytes.
//!
//! The decoder is written for adversarial input: reads are bounds checked,
//! length prefixes are validated before any allocation, and nesting depth is
//! capped.

mod decode;
mod encode;

pub use decode::{
    from_slice, read_value, Decode, Decoder, ListReader, MapReader, MAX_NESTING_DEPTH,
};
pub use encode::{put_described_prefix, to_vec, Encode, ListEncoder};

pub(crate) use decode::descriptor_matches;
