//! Caller-facing search request/response types and the cache fingerprint.

pub mod fingerprint;
pub mod request;
pub mod response;

pub use fingerprint::fingerprint;
pub use request::{Pagination, SearchRequest};
pub use response::{PlatformSearchStatus, SearchResponse};
