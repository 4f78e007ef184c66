//! HTTP transport boundary
//!
//! The harness only ever talks to the remote system through the
//! [`Transport`] trait, so scenarios can be driven against the real
//! network client or an in-memory fake.

pub mod client;
pub mod transport;

pub use client::ReqwestTransport;
pub use transport::{HttpRequest, HttpResponse, Transport};
