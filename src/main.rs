#![allow(clippy::too_many_arguments)]

mod cli;

use std::process::ExitCode;

use clap::Parser;

use canvasfe::logger;
use canvasfe::settings::CanvasSettings;

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    let settings = CanvasSettings::load();

    // Initialize session log (overwrites previous session log)
    logger::init(settings.log_level);
    log::info!("CanvasFE {} starting", env!("CARGO_PKG_VERSION"));

    let code = cli::run(args, &settings);
    log::logger().flush();
    code
}
