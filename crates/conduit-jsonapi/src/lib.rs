//! The reference JSON:API HTTP `Source` (spec.md §1, §6): URL building,
//! JSON:API document (de)serialization, one HTTP request per `Operation`
//! variant, and the sequential-dispatch/fan-out-cap semantics spec.md §7
//! requires of a multi-request fetch or transform.

pub mod client;
pub mod config;
pub mod document;
pub mod source;
pub mod transport;
pub mod url;

pub use client::JsonApiClient;
pub use config::JsonApiConfig;
pub use source::JsonApiSource;
pub use transport::{ReqwestTransport, Transport};
