//! Short identifier generation for URLc.
//!
//! A short id is a pure function of the payload: the payload is hashed with
//! 64-bit FNV-1a and the hash is rendered with [sqids](https://sqids.org)
//! over an [`Alphabet`]. No randomness and no call-order dependence is
//! involved, so the same payload always yields the same
//! [`ShortId`](urlc_types::ShortId).
//!
//! Distinct payloads may collide in the 64-bit space. Collisions are not
//! detected here; storage backends report them as conflicts because they
//! compare the stored payload on insert.

pub mod alphabet;
pub mod error;
pub mod generator;
pub mod hasher;

pub use alphabet::Alphabet;
pub use error::IdError;
pub use generator::ShortIdGenerator;
pub use hasher::fnv1a_64;
