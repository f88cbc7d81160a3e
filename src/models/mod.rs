//! Data models for sitegrazer.

mod error_kind;
mod url_record;

pub use error_kind::ErrorKind;
pub use url_record::{url_hash, UrlRecord};
