//! The RPC Surface (§4.12): an `axum` server exposing the coordinator's
//! routes, a `tower` auth middleware layer wrapping `hybridgrid-auth`, and
//! `reqwest` clients for both directions of the wire (coordinator calling a
//! worker's `/v1/compile`, and a worker or the CLI calling the coordinator).
//!
//! HTTP/JSON over `axum`/`reqwest` was chosen over a gRPC/protobuf stack for
//! build-simplicity; see `DESIGN.md` for the rationale.

mod client;
mod error;
mod server;

pub use client::{CoordinatorClient, WorkerClient};
pub use error::ApiError;
pub use server::{router, AppState};
