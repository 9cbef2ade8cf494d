//! HTTP exchange layer
//!
//! The transport is a seam: production runs use a blocking reqwest client,
//! tests plug in [`MockTransport`].

pub mod executor;
pub mod mock;
pub mod transport;

pub use executor::{
    extract_as, join_path, validate_status, Exchange, LogDetail, RequestExecutor, RequestTemplate,
    Response, ResponseTemplate, RetryPolicy,
};
pub use mock::MockTransport;
pub use transport::{HttpRequest, Method, RawResponse, ReqwestTransport, Transport, TransportError};
