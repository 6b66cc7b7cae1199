//! Print the toolchain report and exit non-zero if any check failed
//!
//! ```bash
//! cargo run --bin check_env
//! ```

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let passed = wharton::env_check::main().context("writing environment report")?;
    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
