//! RLP (recursive length prefix) encoding support.
//!
//! RLP is the serialization format transaction envelopes are flattened into
//! before signing and broadcasting. This module is a thin proxy over the
//! [`open-fastrlp`](https://docs.rs/open-fastrlp/latest/) crate: anything
//! documented there about the [`Encodable`] and [`Decodable`] traits applies
//! here. Integers encode as minimal big-endian byte strings, fixed hashes and
//! addresses as fixed-width byte strings, and structs as lists headed by
//! [`Header`].

pub use bytes::{Buf, BufMut, Bytes, BytesMut};
pub use open_fastrlp::{
    Decodable, DecodeError as RLPError, Encodable, Header, EMPTY_LIST_CODE, EMPTY_STRING_CODE,
};

/// Convenience alias for a result of fallible RLP decoding.
pub type RLPResult<T> = Result<T, RLPError>;
