#![allow(dead_code)]

use assert_cmd::cargo_bin;
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::Value;
use std::io::Write;
use std::process::Command;
use std::sync::Arc;
use tempfile::NamedTempFile;
use vending_machine::application::machine::VendingMachine;
use vending_machine::domain::coin::{CoinLedger, DEFAULT_DENOMINATIONS};
use vending_machine::infrastructure::in_memory::in_memory_stores;
use vending_machine::infrastructure::jwt::JwtTokenIssuer;
use vending_machine::infrastructure::password::Argon2Hasher;

/// A fresh machine over its own in-memory stores.
pub fn machine() -> VendingMachine {
    VendingMachine::new(
        in_memory_stores(),
        CoinLedger::default(),
        Arc::new(Argon2Hasher::with_params(8, 1, 1).unwrap()),
        Arc::new(JwtTokenIssuer::new("test-secret", chrono::Duration::days(30))),
    )
}

/// Signs up and logs in, returning the bearer value.
pub async fn login_as(machine: &VendingMachine, username: &str, role: &str) -> String {
    machine.sign_up(username, "pw", role).await.unwrap();
    let token = machine.login(username, "pw").await.unwrap();
    format!("Bearer {token}")
}

pub fn random_coins<R: Rng>(rng: &mut R, count: usize) -> Vec<i64> {
    (0..count)
        .map(|_| *DEFAULT_DENOMINATIONS.choose(rng).unwrap() as i64)
        .collect()
}

pub fn write_script(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file.flush().unwrap();
    file
}

/// The binary with a secret and cheap hashing set through the environment.
pub fn vending_machine_cmd() -> Command {
    let mut cmd = Command::new(cargo_bin!("vending-machine"));
    cmd.env("VENDING_MACHINE_SECRET", "cli-test-secret")
        .env("VENDING_MACHINE_HASHING__MEMORY_KIB", "8")
        .env("VENDING_MACHINE_HASHING__ITERATIONS", "1")
        .env("VENDING_MACHINE_HASHING__PARALLELISM", "1")
        .env_remove("RUST_LOG");
    cmd
}

pub fn responses(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
