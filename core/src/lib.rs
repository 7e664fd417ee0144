//! Blocking client for the accounts API of a Form3-style ledger.
//!
//! # Overview
//! `AccountsClient` creates, fetches, deletes and lists account records and
//! checks the service's health. Every operation is split into a pure
//! `build_*` / `parse_*` pair around a `Transport`, so request construction
//! and status interpretation are testable without a network.
//!
//! # Design
//! - Configuration is fixed at construction through `ClientBuilder`.
//! - Each executing call takes a `Context` carrying cancellation and an
//!   optional deadline; a done context is reported as `ApiError::Cancelled`,
//!   never as a transport failure.
//! - Operations accept exactly one success status.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod transport;
pub mod types;

pub use client::AccountsClient;
pub use config::{ClientBuilder, ClientConfig, Credentials, PollPolicy};
pub use context::Context;
pub use error::{ApiError, Cancelled, Operation};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::{Transport, UreqTransport};
pub use types::{Account, AccountList, Attributes, Data, Pagination};
