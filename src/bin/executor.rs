use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use replvisor::cli::ExecutorCli;
use replvisor::logging::init_logging;
use replvisor::shutdown::cancel_on_signal;
use replvisor::{Executor, MongodNode};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = ExecutorCli::parse();
    if let Err(e) = init_logging(&cli.log.level, cli.log.format) {
        eprintln!("replvisor-executor: {e}");
        return ExitCode::from(3);
    }

    let cfg = cli.into_config();
    info!(node_type = %cfg.node_type, version = env!("CARGO_PKG_VERSION"), "replvisor executor starting");

    let mut node = MongodNode::new(&cfg);
    let executor = Executor::new(cfg);
    let _signals = cancel_on_signal(executor.stop_token());

    match executor.run(&mut node).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, label = e.as_label(), "executor failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
