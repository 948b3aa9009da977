use atrium_rs::cli::{Cli, execute_command, load_and_merge_config};
use atrium_rs::logger::init_logger;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = load_and_merge_config(&cli)?;

    // Dry runs report on stdout; keep them free of log lines.
    if !cli.is_dry_run() {
        init_logger(&settings.logger)?;
    }

    execute_command(&cli, settings).await.inspect_err(|e| {
        tracing::error!(error = %e, "atrium-rs exited with an error");
    })
}
