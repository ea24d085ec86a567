//! SQLite-backed storage for hosts, organizational units, option-sets,
//! jobs and logs.
//!
//! The protocol core treats this as a synchronous, authoritative
//! collaborator: simple keyed CRUD, no caching beyond one poll cycle.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

use crate::amt::Optionset;
use crate::error::Result;

/// Schema version - bump on incompatible changes
const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ou (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id     INTEGER,
    optionset_id  INTEGER,
    name          TEXT NOT NULL,
    description   TEXT DEFAULT '',
    idle_power    REAL DEFAULT 0,
    logging       INTEGER DEFAULT 1
);

CREATE TABLE IF NOT EXISTS host (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    ou_id         INTEGER NOT NULL,
    hostname      TEXT NOT NULL,
    enabled       INTEGER DEFAULT 1
);

CREATE TABLE IF NOT EXISTS optionset (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    name           TEXT NOT NULL,
    description    TEXT DEFAULT '',
    sw_scan22      INTEGER DEFAULT 1,
    sw_scan3389    INTEGER DEFAULT 1,
    sw_usetls      INTEGER DEFAULT 0,
    sw_skipcertchk INTEGER DEFAULT 0,
    opt_timeout    INTEGER DEFAULT 10,
    opt_passfile   TEXT DEFAULT '',
    opt_cacertfile TEXT DEFAULT ''
);

CREATE TABLE IF NOT EXISTS job (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    job_type      INTEGER NOT NULL,
    amtc_cmd      TEXT NOT NULL,
    amtc_delay    REAL DEFAULT 2.5,
    ou_id         INTEGER,
    start_time    INTEGER,
    repeat_days   INTEGER DEFAULT 0,
    last_started  INTEGER,
    last_done     INTEGER,
    description   TEXT
);

CREATE TABLE IF NOT EXISTS statelog (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    host_id       INTEGER NOT NULL,
    state_begin   INTEGER,
    open_port     INTEGER,
    state_amt     INTEGER,
    state_http    INTEGER
);
CREATE INDEX IF NOT EXISTS idx_statelog_host ON statelog(host_id);
CREATE INDEX IF NOT EXISTS idx_statelog_begin ON statelog(state_begin);

CREATE TABLE IF NOT EXISTS notification (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    tstamp        INTEGER,
    ntype         TEXT,
    message       TEXT
);
"#;

/// A managed client PC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: i64,
    pub ou_id: i64,
    pub hostname: String,
    pub enabled: bool,
}

/// Organizational unit: a group of hosts sharing one option-set policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ou {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub optionset_id: Option<i64>,
    pub name: String,
    pub description: String,
    /// Monitoring+logging flag (labelled "Log" in the legacy GUI)
    pub logging: bool,
}

/// A scheduled or interactive job row, consumed read-only by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    /// 1=interactive, 2=scheduled, 3=monitor
    pub job_type: i64,
    /// Single-letter command code (U/D/R/B/S/X/H)
    pub amtc_cmd: String,
    /// Inter-host delay in seconds
    pub amtc_delay: f64,
    pub ou_id: Option<i64>,
    /// Minutes since midnight
    pub start_time: i64,
    /// Bit per weekday, bit 0 = Sunday
    pub repeat_days: i64,
    pub last_started: Option<i64>,
    pub last_done: Option<i64>,
    pub description: Option<String>,
}

/// Dashboard notification category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    User,
    PowerOn,
    PowerOff,
    Warning,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::User => "user",
            NotificationKind::PowerOn => "toggle-on",
            NotificationKind::PowerOff => "toggle-off",
            NotificationKind::Warning => "warning",
        }
    }
}

/// SQLite-backed store shared by the monitor, scheduler and CLI server
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn hosts(&self) -> Result<Vec<Host>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, ou_id, hostname, enabled FROM host")?;
        let rows = stmt.query_map([], |row| {
            Ok(Host {
                id: row.get(0)?,
                ou_id: row.get(1)?,
                hostname: row.get(2)?,
                enabled: row.get::<_, i64>(3)? != 0,
            })
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn hosts_by_ou(&self, ou_id: i64) -> Result<Vec<Host>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, ou_id, hostname, enabled FROM host WHERE ou_id = ?1")?;
        let rows = stmt.query_map([ou_id], |row| {
            Ok(Host {
                id: row.get(0)?,
                ou_id: row.get(1)?,
                hostname: row.get(2)?,
                enabled: row.get::<_, i64>(3)? != 0,
            })
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn ous(&self) -> Result<Vec<Ou>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, parent_id, optionset_id, name, description, logging FROM ou",
        )?;
        let rows = stmt.query_map([], map_ou)?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn ou(&self, id: i64) -> Result<Option<Ou>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, parent_id, optionset_id, name, description, logging FROM ou WHERE id = ?1",
                [id],
                map_ou,
            )
            .optional()?;
        Ok(row)
    }

    pub fn optionsets(&self) -> Result<Vec<Optionset>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, sw_scan22, sw_scan3389, sw_usetls, sw_skipcertchk,
                    opt_timeout, opt_passfile, opt_cacertfile
             FROM optionset",
        )?;
        let rows = stmt.query_map([], map_optionset)?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn optionset(&self, id: i64) -> Result<Option<Optionset>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, name, sw_scan22, sw_scan3389, sw_usetls, sw_skipcertchk,
                        opt_timeout, opt_passfile, opt_cacertfile
                 FROM optionset WHERE id = ?1",
                [id],
                map_optionset,
            )
            .optional()?;
        Ok(row)
    }

    /// Recurring jobs due at the given weekday (1=Sunday..7=Saturday) and
    /// minute of day.
    pub fn scheduled_jobs(&self, weekday: u32, minute_of_day: u32) -> Result<Vec<Job>> {
        let mask = 1i64 << (weekday.saturating_sub(1));
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, job_type, amtc_cmd, amtc_delay, ou_id, start_time, repeat_days,
                    last_started, last_done, description
             FROM job
             WHERE job_type = 2 AND start_time = ?1 AND (repeat_days & ?2) != 0",
        )?;
        let rows = stmt.query_map(params![minute_of_day, mask], map_job)?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn insert_statelog(
        &self,
        host_id: i64,
        state_http: u16,
        state_amt: i32,
        open_port: u16,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.conn().execute(
            "INSERT INTO statelog (host_id, state_begin, open_port, state_amt, state_http)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![host_id, now, open_port, state_amt, state_http],
        )?;
        Ok(())
    }

    pub fn statelog_count(&self, host_id: i64) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM statelog WHERE host_id = ?1",
            [host_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn insert_notification(&self, kind: NotificationKind, message: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.conn().execute(
            "INSERT INTO notification (tstamp, ntype, message) VALUES (?1, ?2, ?3)",
            params![now, kind.as_str(), message],
        )?;
        Ok(())
    }

    pub fn notifications(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT ntype, message FROM notification ORDER BY id")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    // CRUD below belongs to the GUI layer; the loops only read.

    pub fn insert_ou(&self, ou: &Ou) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO ou (parent_id, optionset_id, name, description, logging)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![ou.parent_id, ou.optionset_id, ou.name, ou.description, ou.logging as i64],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_host(&self, host: &Host) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO host (ou_id, hostname, enabled) VALUES (?1, ?2, ?3)",
            params![host.ou_id, host.hostname, host.enabled as i64],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_optionset(&self, set: &Optionset) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO optionset (name, sw_scan22, sw_scan3389, sw_usetls, sw_skipcertchk,
                                    opt_timeout, opt_passfile, opt_cacertfile)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                set.name,
                set.scan_22 as i64,
                set.scan_3389 as i64,
                set.use_tls as i64,
                set.skip_cert_check as i64,
                set.timeout_secs as i64,
                set.passfile,
                set.cacert_file
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_job(&self, job: &Job) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO job (job_type, amtc_cmd, amtc_delay, ou_id, start_time, repeat_days, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                job.job_type,
                job.amtc_cmd,
                job.amtc_delay,
                job.ou_id,
                job.start_time,
                job.repeat_days,
                job.description
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

fn map_ou(row: &Row<'_>) -> rusqlite::Result<Ou> {
    Ok(Ou {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        optionset_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        logging: row.get::<_, i64>(5)? != 0,
    })
}

fn map_optionset(row: &Row<'_>) -> rusqlite::Result<Optionset> {
    Ok(Optionset {
        id: row.get(0)?,
        name: row.get(1)?,
        scan_22: row.get::<_, i64>(2)? != 0,
        scan_3389: row.get::<_, i64>(3)? != 0,
        use_tls: row.get::<_, i64>(4)? != 0,
        skip_cert_check: row.get::<_, i64>(5)? != 0,
        timeout_secs: row.get::<_, i64>(6)?.max(0) as u64,
        passfile: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        cacert_file: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        ..Optionset::default()
    })
}

fn map_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        job_type: row.get(1)?,
        amtc_cmd: row.get(2)?,
        amtc_delay: row.get::<_, Option<f64>>(3)?.unwrap_or(2.5),
        ou_id: row.get(4)?,
        start_time: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
        repeat_days: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        last_started: row.get(7)?,
        last_done: row.get(8)?,
        description: row.get(9)?,
    })
}
