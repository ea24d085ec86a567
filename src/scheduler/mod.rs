//! Recurring job scheduler.
//!
//! Wakes twice a minute, and when the wall-clock minute has changed,
//! looks up jobs due at the current weekday and minute of day. Each due
//! job resolves its OU's hosts and option-set, then runs sequentially in
//! a background task so one slow batch never delays the next minute.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, Timelike};
use log::{debug, error, warn};

use crate::amt::{self, CommandCode};
use crate::config;
use crate::error::Result;
use crate::storage::{Job, NotificationKind, Store};

/// Wake-up cadence; evaluation happens at most once per minute
pub const WAKE_INTERVAL: Duration = Duration::from_secs(30);

pub struct Scheduler {
    store: Arc<Store>,
}

impl Scheduler {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Run the scheduling loop forever.
    pub async fn run(self: Arc<Self>) {
        let mut gate = MinuteGate::default();
        loop {
            let (weekday, minute) = due_key(&Local::now());
            if gate.should_evaluate(minute) {
                if let Err(err) = self.dispatch_due(weekday, minute).await {
                    error!("scheduler pass failed: {}", err);
                }
            }
            tokio::time::sleep(WAKE_INTERVAL).await;
        }
    }

    /// Launch every recurring job due at this weekday and minute.
    pub async fn dispatch_due(&self, weekday: u32, minute: u32) -> Result<()> {
        for job in self.store.scheduled_jobs(weekday, minute)? {
            debug!("job {} due ({} at minute {})", job.id, job.amtc_cmd, minute);
            if let Err(err) = self.launch(&job, scheduled_kind(&job.amtc_cmd)).await {
                error!("job {} not started: {}", job.id, err);
                self.store.insert_notification(
                    NotificationKind::Warning,
                    &format!("Job {} not started: {}", job.id, err),
                )?;
            }
        }
        Ok(())
    }

    /// Launch a user-submitted job immediately, bypassing the time gate.
    pub async fn run_interactive(&self, job: &Job) -> Result<()> {
        self.launch(job, NotificationKind::User).await
    }

    async fn launch(&self, job: &Job, kind: NotificationKind) -> Result<()> {
        let cmd = CommandCode::from_short_code(&job.amtc_cmd)?;

        let Some(ou_id) = job.ou_id else {
            warn!("job {} has no OU, skipping", job.id);
            return Ok(());
        };
        let Some(ou) = self.store.ou(ou_id)? else {
            warn!("job {} references missing OU {}, skipping", job.id, ou_id);
            return Ok(());
        };
        let Some(set_id) = ou.optionset_id else {
            warn!("OU '{}' has no option-set, skipping job {}", ou.name, job.id);
            return Ok(());
        };
        let Some(mut set) = self.store.optionset(set_id)? else {
            warn!(
                "OU '{}' references missing option-set {}, skipping job {}",
                ou.name, set_id, job.id
            );
            return Ok(());
        };
        config::resolve_credentials(&mut set)?;

        let hosts: Vec<String> = self
            .store
            .hosts_by_ou(ou_id)?
            .into_iter()
            .filter(|host| host.enabled)
            .map(|host| host.hostname)
            .collect();
        if hosts.is_empty() {
            debug!("OU '{}' has no enabled hosts, nothing to do", ou.name);
            return Ok(());
        }

        self.store.insert_notification(
            kind,
            &format!("{} '{}' ({} hosts)", cmd.name(), ou.name, hosts.len()),
        )?;

        let delay = Duration::from_millis((job.amtc_delay.max(0.0) * 1000.0) as u64);
        tokio::spawn(async move {
            amt::sequential_command(cmd, &hosts, &set, delay).await;
        });
        Ok(())
    }
}

/// Admits one evaluation per wall-clock minute; further wakes within the
/// same minute are no-ops.
#[derive(Default)]
struct MinuteGate {
    last_minute: Option<u32>,
}

impl MinuteGate {
    fn should_evaluate(&mut self, minute: u32) -> bool {
        if self.last_minute == Some(minute) {
            false
        } else {
            self.last_minute = Some(minute);
            true
        }
    }
}

/// (weekday, minute-of-day) pair used as the due key; weekday counts
/// 1=Sunday through 7=Saturday.
fn due_key<T: Datelike + Timelike>(now: &T) -> (u32, u32) {
    (
        now.weekday().number_from_sunday(),
        now.hour() * 60 + now.minute(),
    )
}

/// Notification category for a scheduled command
fn scheduled_kind(short_code: &str) -> NotificationKind {
    match short_code {
        "U" => NotificationKind::PowerOn,
        "D" | "S" => NotificationKind::PowerOff,
        _ => NotificationKind::User,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amt::Optionset;
    use crate::storage::{Host, Ou};
    use chrono::NaiveDate;

    fn seeded_scheduler() -> Scheduler {
        let store = Store::open_in_memory().unwrap();
        let set_id = store
            .insert_optionset(&Optionset {
                name: "plain".to_string(),
                timeout_secs: 1,
                ..Optionset::default()
            })
            .unwrap();
        let ou_id = store
            .insert_ou(&Ou {
                id: 0,
                parent_id: None,
                optionset_id: Some(set_id),
                name: "E 19".to_string(),
                description: String::new(),
                logging: true,
            })
            .unwrap();
        store
            .insert_host(&Host {
                id: 0,
                ou_id,
                hostname: "labpc-01".to_string(),
                enabled: true,
            })
            .unwrap();
        Scheduler::new(Arc::new(store))
    }

    fn job(cmd: &str, start_time: i64, repeat_days: i64) -> Job {
        Job {
            id: 0,
            job_type: 2,
            amtc_cmd: cmd.to_string(),
            amtc_delay: 0.0,
            ou_id: Some(1),
            start_time,
            repeat_days,
            last_started: None,
            last_done: None,
            description: None,
        }
    }

    #[test]
    fn test_due_key_counts_weekday_from_sunday() {
        // 2026-08-30 is a Sunday
        let sunday = NaiveDate::from_ymd_opt(2026, 8, 30)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        assert_eq!(due_key(&sunday), (1, 480));

        let monday_late = NaiveDate::from_ymd_opt(2026, 8, 31)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap();
        assert_eq!(due_key(&monday_late), (2, 1439));
    }

    #[test]
    fn test_minute_gate_evaluates_once_per_minute() {
        let mut gate = MinuteGate::default();
        assert!(gate.should_evaluate(480));
        assert!(!gate.should_evaluate(480));
        assert!(gate.should_evaluate(481));
        assert!(!gate.should_evaluate(481));
        // wrap past midnight lands on an earlier minute and still fires
        assert!(gate.should_evaluate(0));
    }

    #[test]
    fn test_scheduled_kind_per_command() {
        assert_eq!(scheduled_kind("U"), NotificationKind::PowerOn);
        assert_eq!(scheduled_kind("D"), NotificationKind::PowerOff);
        assert_eq!(scheduled_kind("S"), NotificationKind::PowerOff);
        assert_eq!(scheduled_kind("R"), NotificationKind::User);
    }

    #[tokio::test]
    async fn test_due_job_posts_notification() {
        let scheduler = seeded_scheduler();
        // Monday 08:00, bit 1 = Monday when bit 0 is Sunday
        scheduler.store.insert_job(&job("U", 480, 1 << 1)).unwrap();

        scheduler.dispatch_due(2, 480).await.unwrap();

        let notes = scheduler.store.notifications().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, "toggle-on");
        assert!(notes[0].1.contains("E 19"));
    }

    #[tokio::test]
    async fn test_job_not_due_is_ignored() {
        let scheduler = seeded_scheduler();
        scheduler.store.insert_job(&job("U", 480, 1 << 1)).unwrap();

        scheduler.dispatch_due(2, 481).await.unwrap();

        assert!(scheduler.store.notifications().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command_posts_warning() {
        let scheduler = seeded_scheduler();
        scheduler.store.insert_job(&job("Z", 480, 1 << 1)).unwrap();

        scheduler.dispatch_due(2, 480).await.unwrap();

        let notes = scheduler.store.notifications().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, "warning");
    }

    #[tokio::test]
    async fn test_interactive_job_bypasses_time_gate() {
        let scheduler = seeded_scheduler();
        let mut submitted = job("D", 0, 0);
        submitted.job_type = 1;

        scheduler.run_interactive(&submitted).await.unwrap();

        let notes = scheduler.store.notifications().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, "user");
    }

    #[tokio::test]
    async fn test_job_for_missing_ou_is_skipped_quietly() {
        let scheduler = seeded_scheduler();
        let mut orphan = job("U", 480, 1 << 1);
        orphan.ou_id = Some(999);
        scheduler.store.insert_job(&orphan).unwrap();

        scheduler.dispatch_due(2, 480).await.unwrap();

        assert!(scheduler.store.notifications().unwrap().is_empty());
    }
}
