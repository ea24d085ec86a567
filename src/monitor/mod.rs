//! Background monitoring scanner.
//!
//! Polls every monitored host with the INFO command on a fixed cadence,
//! keeps the latest normalized state per host in memory, and writes a
//! statelog row only when a host's observable state changes.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, error, warn};

use crate::amt::{self, CommandCode, HostResult};
use crate::config;
use crate::error::Result;
use crate::storage::{Host, Ou, Store};

/// Pause between scan cycles
pub const SCAN_INTERVAL: Duration = Duration::from_secs(15);

/// Ceiling on simultaneous in-flight host scans per cycle
pub const MAX_CONCURRENT_SCANS: usize = 200;

type ScanFuture = Pin<Box<dyn Future<Output = HostResult> + Send>>;

/// Monitoring scanner with a differential state table.
///
/// The table maps host id to the last observed [`HostResult`];
/// `state_begin` records when that state was first seen and survives
/// cycles that observe no change.
pub struct Monitor {
    store: Arc<Store>,
    table: Mutex<HashMap<i64, HostResult>>,
}

impl Monitor {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Run scan cycles forever. Cycle failures are logged, never fatal.
    pub async fn run(self: Arc<Self>) {
        loop {
            if let Err(err) = self.scan_cycle().await {
                error!("monitor cycle failed: {}", err);
            }
            tokio::time::sleep(SCAN_INTERVAL).await;
        }
    }

    /// One full pass over every monitored host, drained to completion.
    pub async fn scan_cycle(&self) -> Result<()> {
        let ous: HashMap<i64, Ou> = self
            .store
            .ous()?
            .into_iter()
            .map(|ou| (ou.id, ou))
            .collect();
        let hosts = self.store.hosts()?;

        for mut set in self.store.optionsets()? {
            if let Err(err) = config::resolve_credentials(&mut set) {
                // still scan: hosts answer 401 and that state gets logged
                warn!(
                    "option-set '{}': {}; proceeding with empty credentials",
                    set.name, err
                );
            }
            let targets: Vec<(i64, String)> = monitored_hosts(&hosts, &ous, set.id)
                .into_iter()
                .map(|host| (host.id, host.hostname.clone()))
                .collect();
            if targets.is_empty() {
                continue;
            }
            debug!(
                "scanning {} hosts with option-set '{}'",
                targets.len(),
                set.name
            );

            let options = Arc::new(set);
            scan_bounded(
                targets,
                MAX_CONCURRENT_SCANS,
                |(host_id, hostname)| {
                    let options = Arc::clone(&options);
                    async move {
                        let mut result = amt::run_command(
                            HostResult::for_host(&hostname),
                            CommandCode::Info,
                            &options,
                        )
                        .await;
                        result.host_id = host_id;
                        result
                    }
                },
                |result| self.record(result),
            )
            .await?;
        }
        Ok(())
    }

    /// Fold one scan result into the state table; persist on change only.
    fn record(&self, mut result: HostResult) -> Result<()> {
        result.id = result.host_id;
        let changed = {
            let mut table = self
                .table
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match table.get(&result.host_id) {
                Some(previous) if previous.same_state_as(&result) => false,
                _ => {
                    result.state_begin = chrono::Utc::now().timestamp();
                    table.insert(result.host_id, result.clone());
                    true
                }
            }
        };

        if changed {
            debug!(
                "host {} changed: port {} amt {} http {}",
                result.hostname, result.open_port, result.state_amt, result.state_http
            );
            self.store.insert_statelog(
                result.host_id,
                result.state_http,
                result.state_amt,
                result.open_port,
            )?;
        }
        Ok(())
    }

    /// Current state table, sorted by hostname for stable presentation
    pub fn snapshot(&self) -> Vec<HostResult> {
        let table = self
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut results: Vec<HostResult> = table.values().cloned().collect();
        results.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        results
    }
}

/// Hosts eligible for monitoring under one option-set: the host is
/// enabled, its OU has logging switched on, and the OU is bound to that
/// option-set.
fn monitored_hosts<'a>(hosts: &'a [Host], ous: &HashMap<i64, Ou>, optionset_id: i64) -> Vec<&'a Host> {
    hosts
        .iter()
        .filter(|host| host.enabled)
        .filter(|host| {
            ous.get(&host.ou_id)
                .map(|ou| ou.logging && ou.optionset_id == Some(optionset_id))
                .unwrap_or(false)
        })
        .collect()
}

/// Drive up to `max_concurrent` scans at a time, starting the next one
/// as each finishes, until every target has been scanned. Each result is
/// handed to `on_result` the moment its scan completes, not after the
/// whole batch drains.
async fn scan_bounded<T, F, Fut, S>(
    targets: Vec<T>,
    max_concurrent: usize,
    scan: F,
    mut on_result: S,
) -> Result<()>
where
    T: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = HostResult> + Send + 'static,
    S: FnMut(HostResult) -> Result<()>,
{
    let mut futures: FuturesUnordered<ScanFuture> = FuturesUnordered::new();
    let mut pending = targets.into_iter();

    for target in pending.by_ref().take(max_concurrent) {
        futures.push(Box::pin(scan(target)));
    }

    while let Some(result) = futures.next().await {
        on_result(result)?;
        if let Some(next) = pending.next() {
            futures.push(Box::pin(scan(next)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amt::Optionset;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn result_for(host_id: i64, state_amt: i32, open_port: u16) -> HostResult {
        HostResult {
            host_id,
            hostname: format!("host-{}", host_id),
            state_amt,
            state_http: 200,
            open_port,
            ..HostResult::default()
        }
    }

    fn monitor_with_store() -> Monitor {
        Monitor::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    #[test]
    fn test_first_observation_is_persisted() {
        let monitor = monitor_with_store();
        monitor.record(result_for(1, 0, 3389)).unwrap();
        assert_eq!(monitor.store.statelog_count(1).unwrap(), 1);
    }

    #[test]
    fn test_unchanged_state_is_not_persisted_again() {
        let monitor = monitor_with_store();
        monitor.record(result_for(1, 0, 3389)).unwrap();
        monitor.record(result_for(1, 0, 3389)).unwrap();
        monitor.record(result_for(1, 0, 3389)).unwrap();
        assert_eq!(monitor.store.statelog_count(1).unwrap(), 1);
    }

    #[test]
    fn test_changed_state_is_persisted() {
        let monitor = monitor_with_store();
        monitor.record(result_for(1, 0, 3389)).unwrap();
        monitor.record(result_for(1, 5, 0)).unwrap(); // powered down
        assert_eq!(monitor.store.statelog_count(1).unwrap(), 2);
    }

    #[test]
    fn test_state_begin_survives_unchanged_cycles() {
        let monitor = monitor_with_store();
        monitor.record(result_for(1, 0, 3389)).unwrap();
        let begin = monitor.snapshot()[0].state_begin;

        monitor.record(result_for(1, 0, 3389)).unwrap();
        assert_eq!(monitor.snapshot()[0].state_begin, begin);
    }

    #[test]
    fn test_hosts_tracked_independently() {
        let monitor = monitor_with_store();
        monitor.record(result_for(1, 0, 3389)).unwrap();
        monitor.record(result_for(2, 0, 3389)).unwrap();
        monitor.record(result_for(2, 5, 0)).unwrap();

        assert_eq!(monitor.store.statelog_count(1).unwrap(), 1);
        assert_eq!(monitor.store.statelog_count(2).unwrap(), 2);
        assert_eq!(monitor.snapshot().len(), 2);
    }

    #[test]
    fn test_monitored_hosts_eligibility() {
        let ous: HashMap<i64, Ou> = [
            (
                1,
                Ou {
                    id: 1,
                    parent_id: None,
                    optionset_id: Some(7),
                    name: "monitored".to_string(),
                    description: String::new(),
                    logging: true,
                },
            ),
            (
                2,
                Ou {
                    id: 2,
                    parent_id: None,
                    optionset_id: Some(7),
                    name: "silent".to_string(),
                    description: String::new(),
                    logging: false,
                },
            ),
            (
                3,
                Ou {
                    id: 3,
                    parent_id: None,
                    optionset_id: Some(8),
                    name: "other-set".to_string(),
                    description: String::new(),
                    logging: true,
                },
            ),
        ]
        .into_iter()
        .collect();

        let host = |id, ou_id, enabled| Host {
            id,
            ou_id,
            hostname: format!("h{}", id),
            enabled,
        };
        let hosts = vec![
            host(1, 1, true),  // eligible
            host(2, 1, false), // disabled
            host(3, 2, true),  // logging off
            host(4, 3, true),  // different option-set
            host(5, 99, true), // orphaned OU reference
        ];

        let eligible = monitored_hosts(&hosts, &ous, 7);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, 1);
    }

    #[tokio::test]
    async fn test_scan_bounded_empty() {
        let mut results = Vec::new();
        scan_bounded(
            Vec::<i64>::new(),
            4,
            |_| async { HostResult::default() },
            |result| {
                results.push(result);
                Ok(())
            },
        )
        .await
        .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_scan_bounded_scans_every_target() {
        let mut results = Vec::new();
        let targets: Vec<i64> = (1..=9).collect();
        scan_bounded(
            targets,
            3,
            |host_id| async move {
                HostResult {
                    host_id,
                    ..HostResult::default()
                }
            },
            |result| {
                results.push(result);
                Ok(())
            },
        )
        .await
        .unwrap();

        let mut seen: Vec<i64> = results.iter().map(|r| r.host_id).collect();
        seen.sort();
        assert_eq!(seen, (1..=9).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_scan_bounded_respects_concurrency_ceiling() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        let targets: Vec<i64> = (1..=10).collect();
        let inf = in_flight.clone();
        let max = max_observed.clone();
        let mut completed = 0usize;
        scan_bounded(
            targets,
            2,
            move |host_id| {
                let inf = inf.clone();
                let max = max.clone();
                async move {
                    let current = inf.fetch_add(1, Ordering::SeqCst) + 1;
                    max.fetch_max(current, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    inf.fetch_sub(1, Ordering::SeqCst);
                    HostResult {
                        host_id,
                        ..HostResult::default()
                    }
                }
            },
            |_| {
                completed += 1;
                Ok(())
            },
        )
        .await
        .unwrap();

        assert_eq!(completed, 10);
        assert!(max_observed.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_scan_bounded_delivers_each_result_before_refilling() {
        let started = Arc::new(AtomicUsize::new(0));

        let s = started.clone();
        let mut started_at_delivery = Vec::new();
        scan_bounded(
            vec![1i64, 2],
            1,
            move |host_id| {
                let s = s.clone();
                async move {
                    s.fetch_add(1, Ordering::SeqCst);
                    HostResult {
                        host_id,
                        ..HostResult::default()
                    }
                }
            },
            |_| {
                started_at_delivery.push(started.load(Ordering::SeqCst));
                Ok(())
            },
        )
        .await
        .unwrap();

        // with a window of 1 the first result must arrive before the
        // second scan has even started
        assert_eq!(started_at_delivery, vec![1, 2]);
    }

    #[test]
    fn test_record_mirrors_host_id_into_id() {
        let monitor = monitor_with_store();
        monitor.record(result_for(7, 0, 3389)).unwrap();
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot[0].host_id, 7);
        assert_eq!(snapshot[0].id, 7);
    }

    #[tokio::test]
    async fn test_unreadable_password_file_still_scans_hosts() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let set_id = store
            .insert_optionset(&Optionset {
                name: "broken passfile".to_string(),
                timeout_secs: 1,
                passfile: "/nonexistent/amtpass".to_string(),
                ..Optionset::default()
            })
            .unwrap();
        let ou_id = store
            .insert_ou(&Ou {
                id: 0,
                parent_id: None,
                optionset_id: Some(set_id),
                name: "lab".to_string(),
                description: String::new(),
                logging: true,
            })
            .unwrap();
        // nothing listens on the AMT port locally, so the scan records a
        // transport failure instead of being skipped
        let host_id = store
            .insert_host(&Host {
                id: 0,
                ou_id,
                hostname: "127.0.0.1".to_string(),
                enabled: true,
            })
            .unwrap();

        let monitor = Monitor::new(store);
        monitor.scan_cycle().await.unwrap();

        assert_eq!(monitor.store.statelog_count(host_id).unwrap(), 1);
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].state_amt, 16);
        assert_eq!(snapshot[0].state_http, 0);
    }
}
