//! stderr logging
//!
//! `RUST_LOG` wins when set; otherwise each `-v` raises the level one step
//! from `warn`.

use std::io::{self, IsTerminal};

use tracing_subscriber::EnvFilter;

fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbosity)));

    // A second init (tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .without_time()
        .try_init();
}
