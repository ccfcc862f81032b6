//! `herald-content`: SQLite-backed Content Store and Attachment Store.
//!
//! Content (wiki pages and social posts) is immutable once created, except
//! that attachments may still be appended until the first publish attempt
//! locks the record. Attachments are stored on the local filesystem and
//! referenced by id.

pub mod attachments;
pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use attachments::AttachmentStore;
pub use error::{ContentError, Result};
pub use store::ContentStore;
pub use types::{Attachment, Content, ContentBody, NewContent};
