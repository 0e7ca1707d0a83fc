//! tilde entry point
//!
//! Parses arguments and delegates to the library.

use clap::Parser;

fn main() {
    let cli = tilde::Cli::parse();

    if let Err(e) = tilde::run(cli) {
        eprintln!("tilde: {e:#}");
        std::process::exit(1);
    }
}
