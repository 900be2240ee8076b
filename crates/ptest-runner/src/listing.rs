//! `-l/--list` output: one line per discovered test, or a single
//! "nothing found" line.

use ptest_core::Registry;
use std::io::Write;

pub fn print<W: Write>(registry: &Registry, sink: &mut W) {
    if registry.is_empty() {
        let _ = writeln!(sink, "No ptests found.");
        return;
    }

    let _ = writeln!(sink, "Available ptests:");
    for test in registry {
        let _ = writeln!(sink, "{}\t{}", test.name, test.run_path.display());
    }
}
