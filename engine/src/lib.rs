pub mod codec;
pub mod config;
pub mod document_data_db;
pub mod iterator;
pub mod kv;
pub mod posting_db;

pub use config::StoreConfig;
pub use document_data_db::DocumentDataDb;
pub use iterator::PostingIterator;
pub use kv::{Environment, Table, Transaction};
pub use posting_db::PostingDb;

/// Positive document identifier. Zero is reserved and never stored.
pub type DocId = u32;

/// Sentinel returned by iterators that are before-first or exhausted.
pub const NO_DOC: DocId = 0;

/// Document ids associated with one term, in storage order.
pub type PostingList = Vec<DocId>;
