//! HTTP driver for the hosted backend's PostgREST endpoint.

mod error;
mod rest;

pub use error::RemoteError;
pub use rest::RestGateway;
