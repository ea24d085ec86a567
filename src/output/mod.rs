//! Terminal output for per-host command results.

use colored::Colorize;

use crate::amt::HostResult;
use crate::amt::catalog::{
    self, STATE_TRANSPORT_ERROR, http_status_text, legacy_power_state_text, port_name,
};

/// Human summary of one host result. Transport failures carry their own
/// message and no HTTP status worth decoding.
pub fn describe(result: &HostResult) -> String {
    if result.state_http == 0 {
        result.usermessage.clone()
    } else {
        format!(
            "{} S{} ({})",
            http_status_text(result.state_http),
            result.state_amt,
            legacy_power_state_text(result.state_amt)
        )
    }
}

/// One aligned result line, matching the classic amtc layout
pub fn format_result(cmd_name: &str, result: &HostResult) -> String {
    format!(
        "{} {:<15} OS:{:<7} AMT:{:02} HTTP:{:03} {}",
        cmd_name,
        result.hostname,
        port_name(result.open_port),
        result.state_amt,
        result.state_http,
        describe(result)
    )
}

pub fn print_result(cmd_name: &str, result: &HostResult) {
    let line = format_result(cmd_name, result);
    let colored_line = if result.state_amt == STATE_TRANSPORT_ERROR || result.state_http == 0 {
        line.red()
    } else if result.state_amt == catalog::legacy_power_state(catalog::POWER_STATE_ON) {
        line.green()
    } else {
        line.normal()
    };
    println!("{}", colored_line);
}
