//! Functional tests against real AMT hardware.
//!
//! Opt-in via the `functional-tests` feature and environment variables;
//! these talk to a live machine and are never part of a normal test run.
//!
//! ```bash
//! AMTCTL_TEST_HOST=labpc-01 AMT_PASSWORD=... \
//!     cargo test --features functional-tests --test functional
//! ```

#![cfg(feature = "functional-tests")]

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn test_host() -> String {
    std::env::var("AMTCTL_TEST_HOST")
        .expect("AMTCTL_TEST_HOST must point at a reachable AMT host")
}

#[test]
fn info_answers_from_real_firmware() {
    Command::new(assert_cmd::cargo::cargo_bin!("amtctl"))
        .args(["info", &test_host()])
        .assert()
        .success()
        .stdout(predicate::str::contains("HTTP:200"));
}
