use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use replvisor::cli::WatchdogCli;
use replvisor::logging::init_logging;
use replvisor::{TcpPoller, Watchdog, WatchdogConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = WatchdogCli::parse();
    if let Err(e) = init_logging(&cli.log.level, cli.log.format) {
        eprintln!("replvisor-watchdog: {e}");
        return ExitCode::from(3);
    }

    let cfg = match WatchdogConfig::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, label = e.as_label(), "invalid watchdog configuration");
            return ExitCode::from(3);
        }
    };
    info!(framework = %cfg.framework_name, version = env!("CARGO_PKG_VERSION"), "replvisor watchdog starting");

    let poller = Arc::new(TcpPoller::new(cfg.poll_timeout()));
    let watchdog = Watchdog::new(cfg, poller);

    match watchdog.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, label = e.as_label(), "watchdog shutdown failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
