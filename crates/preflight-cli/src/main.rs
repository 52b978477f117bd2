//! Thin binary forwarding to [`preflight_cli::run`]. Kept separate
//! from the library so embedders can call `run()` programmatically
//! without shelling out.

use std::process::ExitCode;

fn main() -> ExitCode {
    preflight_cli::run()
}
