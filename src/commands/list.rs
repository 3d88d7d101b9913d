//! List commands implementation

use crate::programmers;

/// List all compiled-in programmers
pub fn list_programmers() {
    let available = programmers::available_programmers();
    if available.is_empty() {
        println!("No programmers available (recompile with programmer features enabled)");
        return;
    }

    println!("Supported programmers:");
    println!();
    for p in &available {
        println!("  {:12} - {}", p.name, p.description);
        if !p.aliases.is_empty() {
            println!("  {:12}   aliases: {}", "", p.aliases.join(", "));
        }
    }
}
