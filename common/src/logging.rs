//! Process-wide logger initialization, shared by every binary in this workspace.
//!
//! Mirrors the `env_logger` setup already used by this workspace's daemon test
//! tooling (`env_logger::Builder::from_env(...).init()`), with an `info` default so
//! operators only need to set `RUST_LOG` to get more detail out of a running process.

use log::LevelFilter;

/// Initializes the global logger from `RUST_LOG`, defaulting to `info`.
///
/// Safe to call more than once per process (e.g. from multiple `#[test]`s); later
/// calls are no-ops once a logger is already installed.
pub fn init_default() {
    init(LevelFilter::Info)
}

pub fn init(default_level: LevelFilter) {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_level.to_string()),
    )
    .is_test(cfg!(test))
    .try_init();
}
