//! HTTP/1.1 transport of the SDS data-plane.
//!
//! Requests are framed by hand over sockets handed out by a
//! [`SocketProvider`]: fixed-length or chunked bodies, an ordered host list
//! with failover on I/O errors, and request deadlines turned into socket
//! timeouts plus the `X-oio-timeout` header.

pub mod chunked;
pub mod deadline;
pub mod headers;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod request;
pub mod response;
pub mod settings;
pub mod socket;
pub mod verifier;

pub use deadline::{Deadline, DeadlineManager};
pub use headers::Headers;
pub use request::{Http, RequestBuilder};
pub use response::{Body, Response, ResponseHead};
pub use settings::HttpSettings;
pub use socket::{Connection, SocketProvider, TcpSocketProvider};
pub use verifier::ResponseVerifier;
