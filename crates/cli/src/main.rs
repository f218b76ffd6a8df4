//! geobatch - entry point

use std::process;

use clap::Parser;
use tracing::error;

use geobatch_cli::app::App;
use geobatch_cli::{commands, Cli};

fn main() {
    let cli = Cli::parse();
    geobatch_observability::init();

    let result = App::open(&cli).and_then(|app| commands::run(&cli, &app));

    if let Err(e) = result {
        error!(error = %e, "command failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
