//! Log output for the ledger binaries.
//!
//! Directives come from `--log` or `RUST_LOG`. Without either, the node reports warnings and
//! the ledger's own progress: forks, irreversible blocks and replays.
use std::fmt::Debug;

use lazy_static::lazy_static;
use serde::Serialize;

const DEFAULT_DIRECTIVES: &str = "warn,chainstate=info";

lazy_static! {
    /// Blocks and objects shown by [`pretty_json`] render as JSON when `RUST_LOG_JSON` is set.
    pub static ref RUST_LOG_JSON: bool = std::env::var("RUST_LOG_JSON").is_ok();
}

pub fn init() {
    let directives =
        std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_DIRECTIVES.to_string());
    init_with_directives(&directives);
}

/// For instance `chainstate::chain=trace` follows every applied block and transaction.
pub fn init_with_directives(directives: &str) {
    let mut builder = pretty_env_logger::formatted_timed_builder();
    builder.parse_filters(directives).format_timestamp_millis();
    if let Err(err) = builder.try_init() {
        eprintln!("Ledger logging already initialized, ignoring '{directives}': {err}");
    }
}

/// Captured by the test harness; safe to call from every test.
#[cfg(test)]
pub(crate) fn init_for_tests() {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    let _ = pretty_env_logger::formatted_builder()
        .parse_filters(&directives)
        .is_test(true)
        .try_init();
}

/// Text of a block or ledger object for the CLI and log lines.
pub fn pretty_json<T: Serialize + Debug>(value: &T) -> String {
    render(value, *RUST_LOG_JSON)
}

fn render<T: Serialize + Debug>(value: &T, as_json: bool) -> String {
    if !as_json {
        return format!("{value:?}");
    }
    serde_json::to_string_pretty(value).unwrap_or_else(|err| {
        log::debug!("Falling back to debug output, value is not JSON: {err}");
        format!("{value:?}")
    })
}
