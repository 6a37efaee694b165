//! # hybridgrid-core
//!
//! The facade that wires the distributed build accelerator's components
//! (validation, sanitization, auth, the worker registry and circuit
//! breakers, mDNS discovery, the dispatcher, and the RPC surface) into the
//! two processes the CLI actually runs: a `compile` invocation's local
//! pipeline in [`client`], and the long-running [`coordinator`] and
//! [`worker`] engines.
//!
//! ## Processes
//!
//! - [`client::LocalClient`] drives one wrapped compiler invocation: parse
//!   the argv, decide whether it's worth shipping out, preprocess and
//!   sanitize it locally if so, dispatch through a coordinator, and fall
//!   back to a local compile on any worker-availability failure.
//! - [`coordinator::Coordinator`] owns the worker registry, the
//!   dispatcher, the heartbeat reaper, and the `axum` RPC server.
//! - [`worker::WorkerAgent`] detects this host's capabilities, handshakes
//!   with a coordinator, announces itself over mDNS, and serves its own
//!   `/v1/compile` route until cancelled.
//! - [`shutdown`] provides the SIGINT/SIGTERM-to-`CancellationToken`
//!   bridge and the bounded drain both processes use on exit.

pub mod client;
pub mod coordinator;
pub mod shutdown;
pub mod worker;

pub use client::LocalClient;
pub use coordinator::Coordinator;
pub use worker::{detect_capabilities, WorkerAgent};
