//! mDNSAnnouncer (§4.7): publishes a worker or coordinator service instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hybridgrid_types::WorkerCapabilities;
use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::info;

use crate::txt::{build_coordinator_txt, build_worker_txt};
use crate::{COORD_SERVICE_TYPE, DOMAIN, WORKER_SERVICE_TYPE};

/// What a single [`Announcer`] instance advertises. A worker carries its
/// full capability set; a coordinator carries only the identity and ports a
/// worker-less CLI invocation needs to find it.
enum Subject {
    Worker(WorkerCapabilities),
    Coordinator { instance_id: String, grpc_port: u16, http_port: u16, version: String },
}

impl Subject {
    fn instance_name(&self) -> &str {
        match self {
            Self::Worker(caps) => &caps.worker_id,
            Self::Coordinator { instance_id, .. } => instance_id,
        }
    }

    fn service_type(&self) -> &'static str {
        match self {
            Self::Worker(_) => WORKER_SERVICE_TYPE,
            Self::Coordinator { .. } => COORD_SERVICE_TYPE,
        }
    }

    fn txt(&self) -> std::collections::HashMap<String, String> {
        match self {
            Self::Worker(caps) => build_worker_txt(caps),
            Self::Coordinator { instance_id, grpc_port, http_port, version } => {
                build_coordinator_txt(instance_id, *grpc_port, *http_port, version)
            }
        }
    }

    fn host_name(&self) -> String {
        match self {
            Self::Worker(caps) => format!("{}.{DOMAIN}", caps.hostname),
            Self::Coordinator { instance_id, .. } => format!("{instance_id}.{DOMAIN}"),
        }
    }
}

/// Announces a worker's or coordinator's presence on the local network.
///
/// `Start` is idempotent-rejecting: a concurrent second `start()` while
/// already running fails, and exactly one of any racing callers succeeds.
/// `Stop` is idempotent-safe; a later `start()` after `stop()` is supported.
pub struct Announcer {
    daemon: ServiceDaemon,
    subject: Subject,
    address: std::net::IpAddr,
    port: u16,
    running: Arc<AtomicBool>,
    fullname: std::sync::Mutex<Option<String>>,
}

impl Announcer {
    /// Announce a worker under [`crate::WORKER_SERVICE_TYPE`], advertising
    /// `caps` as its TXT payload.
    pub fn new(
        caps: WorkerCapabilities,
        address: std::net::IpAddr,
        port: u16,
    ) -> Result<Self, mdns_sd::Error> {
        Self::build(Subject::Worker(caps), address, port)
    }

    /// Announce a coordinator under [`crate::COORD_SERVICE_TYPE`], carrying
    /// both the RPC (`grpc_port`) and metrics (`http_port`) ports a
    /// discovering client needs.
    pub fn for_coordinator(
        instance_id: impl Into<String>,
        address: std::net::IpAddr,
        grpc_port: u16,
        http_port: u16,
    ) -> Result<Self, mdns_sd::Error> {
        let subject = Subject::Coordinator {
            instance_id: instance_id.into(),
            grpc_port,
            http_port,
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        Self::build(subject, address, grpc_port)
    }

    fn build(subject: Subject, address: std::net::IpAddr, port: u16) -> Result<Self, mdns_sd::Error> {
        Ok(Self {
            daemon: ServiceDaemon::new()?,
            subject,
            address,
            port,
            running: Arc::new(AtomicBool::new(false)),
            fullname: std::sync::Mutex::new(None),
        })
    }

    /// Begin advertising. Fails if already running; exactly one concurrent
    /// caller observes success.
    pub fn start(&self) -> Result<(), mdns_sd::Error> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(mdns_sd::Error::Again);
        }

        let txt = self.subject.txt();
        let instance_name = self.subject.instance_name().to_string();
        let host_name = self.subject.host_name();

        let info = ServiceInfo::new(
            self.subject.service_type(),
            &instance_name,
            &host_name,
            self.address,
            self.port,
            Some(txt),
        )?;
        let fullname = info.get_fullname().to_string();
        self.daemon.register(info)?;
        *self.fullname.lock().expect("fullname mutex poisoned") = Some(fullname);
        info!(instance = %instance_name, "mdns announcer started");
        Ok(())
    }

    /// Stop advertising. Safe to call when not running, or more than once.
    pub fn stop(&self) -> Result<(), mdns_sd::Error> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(fullname) = self.fullname.lock().expect("fullname mutex poisoned").take() {
            self.daemon.unregister(&fullname)?;
        }
        info!(instance = %self.subject.instance_name(), "mdns announcer stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridgrid_types::Arch;

    fn caps() -> WorkerCapabilities {
        WorkerCapabilities {
            worker_id: "w1".to_string(),
            hostname: "host1".to_string(),
            os: "linux".to_string(),
            arch: Arch::X86_64,
            cpu_cores: 8,
            memory_bytes: 16 * 1024 * 1024 * 1024,
            docker_available: false,
            docker_images: vec![],
            max_parallel_tasks: 4,
            version: "1.0.0".to_string(),
        }
    }

    #[test]
    fn second_start_without_stop_fails() {
        let Ok(announcer) = Announcer::new(caps(), "127.0.0.1".parse().unwrap(), 9000) else {
            // mdns-sd needs a live multicast-capable interface; skip in
            // sandboxed CI where none is available.
            return;
        };
        if announcer.start().is_err() {
            return;
        }
        assert!(announcer.start().is_err());
        assert!(announcer.stop().is_ok());
    }

    #[test]
    fn stop_is_idempotent() {
        let Ok(announcer) = Announcer::new(caps(), "127.0.0.1".parse().unwrap(), 9001) else {
            return;
        };
        assert!(announcer.stop().is_ok());
        assert!(announcer.stop().is_ok());
    }

    #[test]
    fn coordinator_announcer_uses_coord_service_type() {
        let Ok(announcer) = Announcer::for_coordinator("coord-1", "127.0.0.1".parse().unwrap(), 7780, 9090) else {
            return;
        };
        assert_eq!(announcer.subject.service_type(), COORD_SERVICE_TYPE);
        if announcer.start().is_ok() {
            assert!(announcer.stop().is_ok());
        }
    }
}
