//! Server mode: run the monitoring scanner and the job scheduler until
//! interrupted.

use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::error::Result;
use crate::monitor::Monitor;
use crate::scheduler::Scheduler;
use crate::storage::Store;

pub async fn run(db: &Path) -> Result<()> {
    let store = Arc::new(Store::open(db)?);
    info!("server mode, database {}", db.display());

    let monitor = Arc::new(Monitor::new(Arc::clone(&store)));
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&store)));

    let monitor_task = tokio::spawn(Arc::clone(&monitor).run());
    let scheduler_task = tokio::spawn(Arc::clone(&scheduler).run());

    tokio::signal::ctrl_c().await?;
    info!("interrupted, shutting down");
    monitor_task.abort();
    scheduler_task.abort();
    Ok(())
}
