//! mDNS-based coordinator/worker rendezvous (§4.7, §4.8).
//!
//! Workers advertise themselves under [`WORKER_SERVICE_TYPE`] with a TXT
//! record encoding their [`hybridgrid_types::WorkerCapabilities`]; the
//! coordinator advertises under [`COORD_SERVICE_TYPE`] so a worker-less CLI
//! invocation can find it without a `--coordinator` flag. Both directions
//! share the [`txt`] encoding and the browse machinery in [`browser`].

pub mod announcer;
pub mod browser;
pub mod txt;

pub use announcer::Announcer;
pub use browser::{Browser, DiscoveryEvent};

/// Service type workers register under.
pub const WORKER_SERVICE_TYPE: &str = "_hybridgrid._tcp.local.";

/// Service type the coordinator registers under.
pub const COORD_SERVICE_TYPE: &str = "_hybridgrid-coord._tcp.local.";

/// mDNS domain suffix used when building instance hostnames.
pub const DOMAIN: &str = "local.";

/// Half of a worker's advertised TTL is the browser's reaper cadence; see
/// [`hybridgrid_types::worker::DEFAULT_DISCOVERY_TTL`] for the full value.
pub const DEFAULT_BROWSE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
