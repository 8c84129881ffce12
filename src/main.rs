//! Binary entry point. All CLI logic lives in the `cvescan::cli` module.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    if let Err(e) = cvescan::cli::run() {
        eprintln!("cvescan: {e}");
        std::process::exit(e.exit_code());
    }
}
