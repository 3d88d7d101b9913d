//! ecreflash - Safely reflash a running embedded controller
//!
//! The EC keeps servicing the machine's power and battery management while
//! this tool rewrites the flash chip it will boot from next. The hard part
//! is sequencing, not I/O: readiness checks, an operator abort window,
//! lock/unlock notifications, region-scoped erase/write/verify, and honest
//! classification of how it all ended. That lives in `ecreflash-core`; this
//! binary wires it to a programmer backend and the console.
//!
//! Exit status: 0 on a verified success, 1 when the attempt stopped before
//! any flash mutation (abort, not ready, bad image), 2 when flash was
//! disturbed and the device may no longer boot.

mod cli;
mod commands;
mod console;
mod programmers;

use clap::Parser;
use cli::{Cli, Commands};
use ecreflash_core::outcome::Outcome;

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let code = match cli.command {
        Commands::Reflash { image, programmer } => match programmers::open_device(&programmer) {
            Ok(mut dev) => match commands::reflash::run(dev.as_mut(), &image) {
                Outcome::SafeSuccess => 0,
                Outcome::SafeAbort | Outcome::SafeRejected(_) => 1,
                Outcome::UnsafeFailure(_) => 2,
            },
            Err(e) => {
                eprintln!("{}", e);
                1
            }
        },
        Commands::Status { programmer } => {
            let result = programmers::open_device(&programmer)
                .and_then(|mut dev| commands::status::run(dev.as_mut()));
            match result {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("{}", e);
                    1
                }
            }
        }
        Commands::ListProgrammers => {
            commands::list_programmers();
            0
        }
    };

    std::process::exit(code);
}
