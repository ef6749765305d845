//! Tracing subscriber setup for binaries and tests embedding the crate.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered to this crate.
///
/// `RUST_LOG`, when set, takes precedence over the `debug` switch. Returns
/// false if a global subscriber was already installed.
pub fn init_tracing(debug: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("aggpipe_core=debug")
        } else {
            EnvFilter::new("aggpipe_core=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .is_ok()
}
