//! The reflash flow
//!
//! Readiness gate, operator countdown, gate again, then the flash session.
//! The image is loaded and the session constructed before the countdown
//! starts, so every rejectable problem (missing file, wrong size, failed
//! allocation) surfaces while the EC is still untouched. Past the countdown
//! there is no cancellation point.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use ecreflash_core::countdown::{run_countdown, CountdownOutcome, ABORT_TICK, ABORT_WINDOW_TICKS};
use ecreflash_core::ec::{result_name, EcDevice};
use ecreflash_core::outcome::Outcome;
use ecreflash_core::plan::RegionPlan;
use ecreflash_core::protocol::HostFlash;
use ecreflash_core::readiness::check_readiness;
use ecreflash_core::session::{FlashSession, SessionReport};
use ecreflash_core::Error;

use crate::console::{ConsoleObserver, TtyKeys};

/// Run one reflash attempt and report what it amounted to.
pub fn run(dev: &mut dyn EcDevice, image_path: &Path) -> Outcome {
    let (outcome, last_ec_error) = match attempt(dev, image_path) {
        Ok(report) => {
            let last = report.last_ec_error;
            (report.outcome(), last)
        }
        Err(err) => (Outcome::from_error(err), None),
    };
    render(&outcome, last_ec_error);
    outcome
}

fn attempt(dev: &mut dyn EcDevice, image_path: &Path) -> Result<SessionReport, Error> {
    gate(dev)?;

    let image = load_image(image_path)?;
    let session = FlashSession::new(RegionPlan::framework(), image)?;

    println!("*** STARTING FLASH (PRESS ANY KEY TO CANCEL)");
    let mut keys = TtyKeys::new();
    let countdown = run_countdown(&mut keys, ABORT_WINDOW_TICKS, ABORT_TICK, |remaining| {
        print!("{}... ", remaining);
        let _ = std::io::stdout().flush();
    });
    drop(keys);
    println!();
    if countdown == CountdownOutcome::Aborted {
        println!("ABORTED!");
        return Err(Error::Aborted);
    }

    // AC may have been unplugged while the operator watched the countdown.
    gate(dev)?;

    let mut flash = HostFlash::new(&mut *dev);
    Ok(session.run(&mut flash, &mut ConsoleObserver::new()))
}

fn gate(dev: &mut dyn EcDevice) -> Result<(), Error> {
    let status = check_readiness(dev)?;
    if !status.is_ready() {
        return Err(Error::NotReady(status));
    }
    Ok(())
}

fn load_image(path: &Path) -> Result<Vec<u8>, Error> {
    let mut file =
        File::open(path).map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
    log::info!("Read {} bytes from {}", data.len(), path.display());
    Ok(data)
}

fn render(outcome: &Outcome, last_ec_error: Option<i32>) {
    match outcome {
        Outcome::SafeSuccess => {
            println!();
            println!("Looks like it worked.");
            println!("Consider rebooting the EC to start the new firmware.");
        }
        Outcome::SafeAbort => {}
        Outcome::SafeRejected(err) => {
            eprintln!("{}", err);
            eprintln!("The EC was not modified.");
        }
        Outcome::UnsafeFailure(err) => {
            eprintln!("{}", err);
            if let Some(code) = last_ec_error.filter(|&code| code < 0) {
                eprintln!(
                    "Last EC result: {} ({})",
                    code,
                    result_name(code).unwrap_or("unrecognized")
                );
            }
            eprintln!("*** YOUR COMPUTER MAY NO LONGER BOOT ***");
        }
    }
}
