//! Handler for power, boot-order and feature-toggle commands.
//!
//! Hosts run strictly one after another with a pause in between so a
//! room full of machines does not hit the power grid at once.

use std::time::Duration;

use crate::amt::{self, CommandCode, HostResult, Optionset};
use crate::error::Result;
use crate::output;

pub async fn run(
    cmd: CommandCode,
    hosts: &[String],
    options: &Optionset,
    delay: Duration,
) -> Result<()> {
    let mut failed = 0usize;
    for (index, hostname) in hosts.iter().enumerate() {
        let result = amt::run_command(HostResult::for_host(hostname), cmd, options).await;
        if result.state_http != 200 {
            failed += 1;
        }
        output::print_result(cmd.name(), &result);

        if index + 1 < hosts.len() {
            tokio::time::sleep(delay).await;
        }
    }

    println!(
        "{}: {} ok, {} failed",
        cmd.name(),
        hosts.len() - failed,
        failed
    );
    Ok(())
}
