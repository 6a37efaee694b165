//! # hybridgrid-types
//!
//! Core domain types shared across the hybridgrid workspace: the parsed
//! view of a compiler invocation, worker/registry state, the wire-level
//! compile task, and the error taxonomy every component returns.
//!
//! - [`error`] — [`error::HybridGridError`], the taxonomy every fallible
//!   operation in the workspace returns.
//! - [`parsed_args`] — [`parsed_args::ParsedArgs`] and friends, produced by
//!   `hybridgrid-argparse`.
//! - [`worker`] — registry-facing types: capabilities, entries, circuit
//!   state, discovered records.
//! - [`request`] — the RPC-facing [`request::CompileTask`] and
//!   [`request::AuthToken`].
//! - [`duration`] — serde helpers for human-readable durations.

pub mod duration;
pub mod error;
pub mod parsed_args;
pub mod request;
pub mod worker;

pub use error::HybridGridError;
pub use parsed_args::{CompilerFamily, Language, ModeFlags, ParsedArgs};
pub use request::{
    AuthToken, BuildType, CompileOutcome, CompileTask, HandshakeRequest, HandshakeResponse,
    LanguageConfig, TXT_KEYS,
};
pub use worker::{
    Arch, CircuitState, DiscoveredCoordinator, DiscoveredWorker, DiscoverySource,
    WorkerCapabilities, WorkerEntry, DEFAULT_DISCOVERY_TTL,
};

pub type Result<T> = std::result::Result<T, HybridGridError>;
