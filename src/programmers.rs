//! Programmer registration and dispatch
//!
//! Centralized registry mapping `--programmer` names to the EC transports
//! compiled in, with dynamic help text generation.

use ecreflash_core::ec::EcDevice;

/// Information about a programmer
pub struct ProgrammerInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available programmers (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(all(feature = "lpc", any(target_arch = "x86", target_arch = "x86_64")))]
    programmers.push(ProgrammerInfo {
        name: "lpc",
        aliases: &["framework"],
        description: "EC on the LPC bus via port I/O - requires root",
    });

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory EC emulator for testing (size=<bytes>,ac=<bool>,battery=<pct>)",
    });

    programmers
}

/// Generate help text listing all available programmers
pub fn programmer_help() -> String {
    let programmers = available_programmers();

    if programmers.is_empty() {
        return "No programmers available (recompile with programmer features enabled)".to_string();
    }

    let mut help = String::from("Available programmers:\n");

    for p in &programmers {
        help.push_str(&format!("  {:12} - {}\n", p.name, p.description));
    }

    help
}

/// Generate a short list of programmer names for CLI help
pub fn programmer_names_short() -> String {
    let programmers = available_programmers();
    let names: Vec<&str> = programmers.iter().map(|p| p.name).collect();
    names.join(", ")
}

/// Open the EC device named by a programmer string.
///
/// The string can be just the name (e.g., "lpc") or include parameters
/// (e.g., "dummy:size=0x80000,ac=false").
#[allow(unused_variables)]
pub fn open_device(programmer: &str) -> Result<Box<dyn EcDevice>, Box<dyn std::error::Error>> {
    let (name, options) = parse_programmer_string(programmer);

    match name {
        #[cfg(all(feature = "lpc", any(target_arch = "x86", target_arch = "x86_64")))]
        "lpc" | "framework" => {
            log::info!("Opening EC over LPC...");
            let transport = ecreflash_lpc::LpcTransport::open().map_err(|e| {
                format!(
                    "Failed to open the LPC transport: {}\n\
                     Make sure you are running as root on a machine with this EC.",
                    e
                )
            })?;
            Ok(Box::new(transport))
        }

        #[cfg(feature = "dummy")]
        "dummy" => {
            let mut config = ecreflash_dummy::DummyConfig::default();
            for (key, value) in options {
                match key {
                    "size" => {
                        config.flash_size = parse_hex_u32(value)
                            .map_err(|e| format!("Invalid dummy size: {}", e))?
                            as usize;
                    }
                    "ac" => {
                        config.ac_present = value
                            .parse()
                            .map_err(|_| format!("Invalid dummy ac value: {}", value))?;
                    }
                    "battery" => {
                        config.battery_capacity = value
                            .parse()
                            .map_err(|_| format!("Invalid dummy battery percent: {}", value))?;
                        config.battery_full = 100;
                    }
                    other => {
                        return Err(format!("Unknown dummy parameter: {}", other).into());
                    }
                }
            }
            Ok(Box::new(ecreflash_dummy::DummyEc::new(config)))
        }

        _ => Err(unknown_programmer_error(name)),
    }
}

/// Parse a programmer string into name and options
///
/// Format: "name" or "name:option1=value1,option2=value2"
pub fn parse_programmer_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

/// Parse a string as a hex or decimal u32
#[allow(dead_code)]
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

fn unknown_programmer_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown programmer: {}\n\n", name);
    msg.push_str(&programmer_help());
    msg.push_str("\nUse 'ecreflash list-programmers' for more details");
    msg.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programmer_string_splits_name_and_options() {
        let (name, options) = parse_programmer_string("dummy:size=0x1000,ac=false");
        assert_eq!(name, "dummy");
        assert_eq!(options, vec![("size", "0x1000"), ("ac", "false")]);

        let (name, options) = parse_programmer_string("lpc");
        assert_eq!(name, "lpc");
        assert!(options.is_empty());
    }

    #[test]
    fn hex_and_decimal_both_parse() {
        assert_eq!(parse_hex_u32("0x80000"), Ok(0x80000));
        assert_eq!(parse_hex_u32("1024"), Ok(1024));
        assert!(parse_hex_u32("0xZZ").is_err());
    }
}
