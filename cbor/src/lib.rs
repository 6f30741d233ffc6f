/*!
Deterministic CBOR (RFC 8949) serialization primitives.

The [`encode`] module produces definite-length, shortest-form encodings only,
so that a logical value always maps to a single byte sequence. The [`decode`]
module accepts both definite- and indefinite-length items.
*/

pub mod decode;
pub mod encode;

#[cfg(test)]
mod decode_tests;

#[cfg(test)]
mod encode_tests;
