//! REST API client module for the ticketing service.
//!
//! This module provides the `ApiClient` transport, the `ApiError` taxonomy,
//! the `ApiResponse` envelope every endpoint answers with, and the
//! `RetryPolicy` callers use to re-issue transient failures.
//!
//! The service uses JWT bearer token authentication obtained from
//! `POST /auth/login`.

pub mod client;
pub mod endpoints;
pub mod envelope;
pub mod error;
pub mod retry;

pub use client::{ApiClient, RequestBody};
pub use endpoints::SignInError;
pub use envelope::{ApiResponse, PageMeta};
pub use error::ApiError;
pub use retry::{should_retry, RetryPolicy};
