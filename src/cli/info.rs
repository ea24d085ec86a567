//! INFO handler: query all hosts at once, print results as they arrive.
//!
//! Unlike sequential power commands there is no inter-host delay here;
//! a status query is read-only and fan-out keeps large fleets fast.

use futures::stream::{FuturesUnordered, StreamExt};
use log::warn;

use crate::amt::{self, CommandCode, HostResult, Optionset};
use crate::error::Result;
use crate::output;

pub async fn run(hosts: &[String], options: &Optionset, json: bool) -> Result<()> {
    let mut futures: FuturesUnordered<_> = hosts
        .iter()
        .map(|hostname| {
            amt::run_command(HostResult::for_host(hostname), CommandCode::Info, options)
        })
        .collect();

    let mut failed = 0usize;
    let mut collected: Vec<HostResult> = Vec::new();
    while let Some(result) = futures.next().await {
        if result.state_http != 200 {
            failed += 1;
        }
        if json {
            collected.push(result);
        } else {
            output::print_result("INFO", &result);
        }
    }

    if json {
        collected.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        println!("{}", serde_json::to_string_pretty(&collected)?);
    }

    if failed > 0 {
        warn!("{} of {} hosts did not answer", failed, hosts.len());
    }
    Ok(())
}
