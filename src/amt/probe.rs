//! Best-effort TCP probe for auxiliary host ports.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

/// Per-port connect timeout
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Try each candidate port in order; the first that accepts a TCP
/// connection wins and the connection is closed without sending data.
/// Refusals and timeouts are expected outcomes, never errors. Returns 0
/// when nothing is open.
pub async fn probe_host_ports(host: &str, ports: &[u16]) -> u16 {
    for &port in ports {
        let addr = format!("{}:{}", host, port);
        if let Ok(Ok(stream)) = timeout(PROBE_TIMEOUT, TcpStream::connect(&addr)).await {
            drop(stream);
            log::debug!("probe {}: port {} open", host, port);
            return port;
        }
    }
    0
}
