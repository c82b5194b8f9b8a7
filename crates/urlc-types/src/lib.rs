//! Foundation types for URLc.
//!
//! Every other URLc crate depends on `urlc-types`. The types here are the
//! persisted unit of the storage layer and the messages that flow into the
//! deletion pipeline.
//!
//! # Key Types
//!
//! - [`ShortId`] -- content-derived identifier, the primary lookup key
//! - [`UrlRecord`] -- one shortened payload with its owner and tombstone flag
//! - [`DeletionRequest`] -- transient soft-delete message `{short_id, owner_id}`

pub mod error;
pub mod record;
pub mod short_id;

pub use error::TypeError;
pub use record::{DeletionRequest, UrlRecord};
pub use short_id::ShortId;
