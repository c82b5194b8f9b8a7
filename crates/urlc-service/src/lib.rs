//! URLc service layer.
//!
//! Ties the id generator and a storage backend into the shortening workflow
//! ([`UrlService`]) and owns the asynchronous soft-delete pipeline
//! ([`DeletionBatcher`]). Configuration is layered through
//! [`ServiceConfig`].

pub mod batcher;
pub mod config;
pub mod error;
pub mod service;

pub use batcher::{BatcherStats, DeletionBatcher, FlushReport};
pub use config::{BatcherConfig, ServiceConfig};
pub use error::{BatchError, ServiceError, ServiceResult};
pub use service::{BatchItem, BatchResult, UrlService, UserUrl};
