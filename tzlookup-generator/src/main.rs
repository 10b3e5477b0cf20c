//! Command-line driver for the tzlookup.xml generator.

use std::env::args_os;
use std::path::PathBuf;
use std::process::exit;

use tracing_subscriber::EnvFilter;

mod errors;
mod generator;
mod lookup_xml;

use errors::Error;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tzlookup_generator=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("{e}");
        exit(e.exit_code());
    }
}

fn run() -> Result<(), Error> {
    let mut opts = getopts::Options::new();
    opts.reqopt(
        "z",
        "tzdata",
        "directory with the tz source files, zone.tab and backward",
        "DIR",
    );
    opts.reqopt("c", "countryzones", "country zone declaration file", "FILE");
    opts.reqopt("o", "output", "where to write tzlookup.xml", "FILE");

    let matches = match opts.parse(args_os().skip(1)) {
        Ok(matches) => matches,
        Err(fail) => {
            eprint!("{}", opts.usage("Usage: tzlookup-generator -z DIR -c FILE -o FILE"));
            return Err(fail.into());
        }
    };

    let tzdata = PathBuf::from(matches.opt_str("tzdata").expect("required option"));
    let countryzones = PathBuf::from(matches.opt_str("countryzones").expect("required option"));
    let output = PathBuf::from(matches.opt_str("output").expect("required option"));

    generator::generate(&tzdata, &countryzones, &output)?;
    println!("Wrote {}.", output.display());
    Ok(())
}
