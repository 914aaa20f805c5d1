mod cli;
mod config;
mod custom;
mod logging;
mod regions;
mod run;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = if cli.verbose {
        true
    } else {
        logging::env_flag()
    };
    logging::init(verbose);
    match cli.command {
        Command::Regions { book, output } => regions::run(book, output),
        Command::Annotate { config } => run::annotate_from_config(&config),
        Command::XRayDb { config, out } => run::x_ray_db_from_config(&config, &out),
        Command::Custom { action } => custom::run(action),
    }
}
