//! TXT record encoding/decoding for worker and coordinator advertisements.

use std::collections::HashMap;

use hybridgrid_types::{Arch, WorkerCapabilities};

/// Build the TXT key=value set for advertising `caps`. Reserved keys per
/// the data model; `images` is pre-truncated to the first 5 entries to
/// respect the 255-byte-per-entry mDNS TXT limit.
pub fn build_worker_txt(caps: &WorkerCapabilities) -> HashMap<String, String> {
    let mut txt = HashMap::new();
    txt.insert("id".to_string(), caps.worker_id.clone());
    txt.insert("host".to_string(), caps.hostname.clone());
    txt.insert("cpu".to_string(), caps.cpu_cores.to_string());
    txt.insert("ram".to_string(), caps.memory_bytes.to_string());
    txt.insert("arch".to_string(), caps.arch.as_str().to_string());
    txt.insert("docker".to_string(), caps.docker_available.to_string());
    txt.insert("images".to_string(), caps.advertised_images().join(","));
    txt.insert("max_parallel".to_string(), caps.max_parallel_tasks.to_string());
    txt.insert("version".to_string(), caps.version.clone());
    txt.insert("os".to_string(), caps.os.clone());
    txt
}

/// Parse a TXT key=value map back into [`WorkerCapabilities`]. Missing or
/// malformed numeric fields default to zero rather than failing the whole
/// parse — a half-populated record still carries useful fields.
pub fn parse_worker_txt(txt: &HashMap<String, String>) -> WorkerCapabilities {
    WorkerCapabilities {
        worker_id: txt.get("id").cloned().unwrap_or_default(),
        hostname: txt.get("host").cloned().unwrap_or_default(),
        os: txt.get("os").cloned().unwrap_or_default(),
        arch: txt.get("arch").map(|s| Arch::parse(s)).unwrap_or(Arch::Unspecified),
        cpu_cores: txt.get("cpu").and_then(|s| s.parse().ok()).unwrap_or(0),
        memory_bytes: txt.get("ram").and_then(|s| s.parse().ok()).unwrap_or(0),
        docker_available: txt.get("docker").map(|s| s == "true").unwrap_or(false),
        docker_images: txt
            .get("images")
            .map(|s| s.split(',').filter(|i| !i.is_empty()).map(str::to_string).collect())
            .unwrap_or_default(),
        max_parallel_tasks: txt.get("max_parallel").and_then(|s| s.parse().ok()).unwrap_or(0),
        version: txt.get("version").cloned().unwrap_or_default(),
    }
}

/// Build the TXT key=value set for a coordinator advertisement: its
/// `instance_id` plus the two ports it serves (`grpc_port` for the RPC
/// surface, `http_port` for `/metrics`).
pub fn build_coordinator_txt(instance_id: &str, grpc_port: u16, http_port: u16, version: &str) -> HashMap<String, String> {
    let mut txt = HashMap::new();
    txt.insert("instance_id".to_string(), instance_id.to_string());
    txt.insert("grpc_port".to_string(), grpc_port.to_string());
    txt.insert("http_port".to_string(), http_port.to_string());
    txt.insert("version".to_string(), version.to_string());
    txt
}

/// Parse a coordinator's TXT map into its `(instance_id, grpc_port, http_port)`,
/// defaulting missing/malformed fields the same way [`parse_worker_txt`] does.
pub fn parse_coordinator_txt(txt: &HashMap<String, String>) -> (String, u16, u16) {
    let instance_id = txt.get("instance_id").cloned().unwrap_or_default();
    let grpc_port = txt.get("grpc_port").and_then(|s| s.parse().ok()).unwrap_or(0);
    let http_port = txt.get("http_port").and_then(|s| s.parse().ok()).unwrap_or(0);
    (instance_id, grpc_port, http_port)
}

/// Split a raw mDNS TXT string (`SplitN k=v, first '='`) into a map, as the
/// browser receives it from the wire.
pub fn decode_txt_strings(entries: impl IntoIterator<Item = String>) -> HashMap<String, String> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let mut parts = entry.splitn(2, '=');
            let key = parts.next()?.to_string();
            let value = parts.next().unwrap_or("").to_string();
            Some((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_caps() -> WorkerCapabilities {
        WorkerCapabilities {
            worker_id: "w1".to_string(),
            hostname: "host1".to_string(),
            os: "linux".to_string(),
            arch: Arch::X86_64,
            cpu_cores: 8,
            memory_bytes: 16 * 1024 * 1024 * 1024,
            docker_available: true,
            docker_images: (0..7).map(|i| format!("img{i}")).collect(),
            max_parallel_tasks: 4,
            version: "1.2.3".to_string(),
        }
    }

    #[test]
    fn round_trip_reproduces_advertised_fields() {
        let caps = sample_caps();
        let txt = build_worker_txt(&caps);
        let parsed = parse_worker_txt(&txt);

        assert_eq!(parsed.worker_id, caps.worker_id);
        assert_eq!(parsed.hostname, caps.hostname);
        assert_eq!(parsed.cpu_cores, caps.cpu_cores);
        assert_eq!(parsed.memory_bytes, caps.memory_bytes);
        assert_eq!(parsed.arch, caps.arch);
        assert_eq!(parsed.docker_images.len(), 5);
    }

    #[test]
    fn decode_splits_on_first_equals_only() {
        let decoded = decode_txt_strings(vec!["key=a=b=c".to_string(), "flag".to_string()]);
        assert_eq!(decoded.get("key"), Some(&"a=b=c".to_string()));
        assert_eq!(decoded.get("flag"), Some(&"".to_string()));
    }

    #[test]
    fn coordinator_txt_round_trips() {
        let txt = build_coordinator_txt("coord-1", 7780, 9090, "1.2.3");
        let (instance_id, grpc_port, http_port) = parse_coordinator_txt(&txt);
        assert_eq!(instance_id, "coord-1");
        assert_eq!(grpc_port, 7780);
        assert_eq!(http_port, 9090);
    }
}
