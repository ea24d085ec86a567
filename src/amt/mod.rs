//! AMT protocol engine: one full WS-Man command execution per host.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod digest;
pub mod probe;
pub mod wsman;

pub use catalog::CommandCode;
use catalog::{POWER_STATE_ON, STATE_TRANSPORT_ERROR};
use digest::{DigestClient, TlsConfig};

/// Default AMT request timeout when an option-set leaves it unset
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Connection parameters applied to a group of hosts.
///
/// Mirrors the `optionset` storage row, with credentials resolved at
/// dispatch time. If `skip_cert_check` is set, CA material is ignored;
/// if CA bytes are present otherwise, verification uses exactly that
/// trust root.
#[derive(Debug, Clone, Default)]
pub struct Optionset {
    pub id: i64,
    pub name: String,
    pub scan_22: bool,
    pub scan_3389: bool,
    pub use_tls: bool,
    pub skip_cert_check: bool,
    pub timeout_secs: u64,
    pub passfile: String,
    pub cacert_file: String,
    pub username: String,
    pub password: String,
    /// Loaded contents of `cacert_file`
    pub ca_pem: Option<Vec<u8>>,
}

impl Optionset {
    pub fn timeout(&self) -> Duration {
        if self.timeout_secs == 0 {
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.timeout_secs)
        }
    }

    pub fn tls_config(&self) -> TlsConfig {
        TlsConfig {
            skip_verify: self.skip_cert_check,
            ca_pem: if self.skip_cert_check {
                None
            } else {
                self.ca_pem.clone()
            },
        }
    }

    /// Auxiliary ports to probe when a host reports "on", in probe order
    pub fn probe_ports(&self) -> Vec<u16> {
        let mut ports = Vec::new();
        if self.scan_3389 {
            ports.push(3389);
        }
        if self.scan_22 {
            ports.push(22);
        }
        ports
    }
}

/// Normalized per-host outcome of one command execution ("Laststate").
///
/// `state_begin` is the wall-clock time the current normalized state
/// first became true; the monitoring scanner overwrites it only when the
/// (open_port, state_amt, state_http, usermessage) tuple changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostResult {
    pub id: i64,
    pub host_id: i64,
    pub hostname: String,
    pub state_begin: i64,
    pub open_port: u16,
    pub state_amt: i32,
    pub state_http: u16,
    pub usermessage: String,
}

impl HostResult {
    pub fn for_host(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            ..Self::default()
        }
    }

    /// Change-detection tuple that gates statelog persistence
    pub fn same_state_as(&self, other: &HostResult) -> bool {
        self.open_port == other.open_port
            && self.state_amt == other.state_amt
            && self.state_http == other.state_http
            && self.usermessage == other.usermessage
    }

    fn transport_failure(mut self, message: String) -> Self {
        self.state_amt = STATE_TRANSPORT_ERROR;
        self.state_http = 0;
        self.usermessage = message;
        self
    }
}

/// Execute a single AMT command against one host.
///
/// Transport failures are terminal per attempt and reported as AMT code
/// 16 with HTTP status 0; retries are the caller's responsibility.
pub async fn run_command(host: HostResult, cmd: CommandCode, options: &Optionset) -> HostResult {
    let (scheme, port) = if options.use_tls {
        ("https", 16993)
    } else {
        ("http", 16992)
    };
    let uri = format!("{}://{}:{}/wsman", scheme, host.hostname, port);
    log::debug!("{} host {} via {}", cmd.name(), host.hostname, uri);
    execute_at(host, &uri, cmd, options, &options.probe_ports()).await
}

async fn execute_at(
    mut result: HostResult,
    uri: &str,
    cmd: CommandCode,
    options: &Optionset,
    probe_ports: &[u16],
) -> HostResult {
    let def = cmd.definition();

    let mut client = match DigestClient::new(
        &options.username,
        &options.password,
        options.timeout(),
        &options.tls_config(),
    ) {
        Ok(client) => client,
        Err(err) => return result.transport_failure(err.to_string()),
    };

    let (status, body) = match client.execute("POST", uri, def.step_one).await {
        Ok(response) => response,
        Err(err) => return result.transport_failure(err.to_string()),
    };
    result.state_http = status;

    if !def.two_step || status != 200 {
        return result;
    }

    let step_two = if cmd == CommandCode::Info {
        let token = wsman::enumeration_context(&body);
        wsman::fill_enum_context(def.step_two, token)
    } else {
        def.step_two.to_string()
    };

    let (status, body) = match client.execute("POST", uri, &step_two).await {
        Ok(response) => response,
        Err(err) => return result.transport_failure(err.to_string()),
    };
    result.state_http = status;

    if cmd == CommandCode::Info && status == 200 {
        let cim_state = wsman::power_state(&body);
        result.state_amt = catalog::legacy_power_state(cim_state);
        if cim_state == POWER_STATE_ON && !probe_ports.is_empty() {
            result.open_port = probe::probe_host_ports(&result.hostname, probe_ports).await;
        }
    }

    result
}

/// Execute a command on hosts one after another with an inter-host delay.
///
/// Used for scheduled and interactive jobs; per-host failures never abort
/// the batch. Returns (succeeded, failed) counts.
pub async fn sequential_command(
    cmd: CommandCode,
    hosts: &[String],
    options: &Optionset,
    delay: Duration,
) -> (usize, usize) {
    log::info!(
        "running {} on {} hosts with {:?} delay",
        cmd.name(),
        hosts.len(),
        delay
    );

    let mut succeeded = 0;
    let mut failed = 0;
    for hostname in hosts {
        let result = run_command(HostResult::for_host(hostname), cmd, options).await;
        if result.state_http == 200 {
            succeeded += 1;
        } else {
            failed += 1;
            log::warn!(
                "{} {} failed: HTTP {} {}",
                cmd.name(),
                hostname,
                result.state_http,
                result.usermessage
            );
        }
        tokio::time::sleep(delay).await;
    }

    log::info!("{} done: {} ok, {} failed", cmd.name(), succeeded, failed);
    (succeeded, failed)
}
