//! EC readiness query

use ecreflash_core::ec::EcDevice;
use ecreflash_core::readiness::{check_readiness, MIN_BATTERY_PERCENT};

/// Print the telemetry the reflash gate decides on.
pub fn run(dev: &mut dyn EcDevice) -> Result<(), Box<dyn std::error::Error>> {
    let status = check_readiness(dev)?;

    println!("EC Readiness");
    println!("============");
    println!();
    println!("EC:        present");
    println!(
        "AC power:  {}",
        if status.ac_present { "connected" } else { "disconnected" }
    );
    match status.battery_percent {
        Some(percent) => println!("Battery:   {}%", percent),
        None => println!("Battery:   capacity unknown (full-charge counter reads zero)"),
    }
    println!();
    if status.is_ready() {
        println!("Ready to flash.");
    } else {
        println!(
            "Not ready to flash: AC must be connected and the battery at least {}% charged.",
            MIN_BATTERY_PERCENT
        );
    }

    Ok(())
}
