//! setproxy - privileged helper pointing the system proxy at Proxydetox.
//!
//! Usage: `setproxy <port>`. Port `0` disables the HTTP/HTTPS proxies of
//! every Wi-Fi and Ethernet service; any other port routes them to
//! `127.0.0.1:<port>`.
//!
//! Failures are printed as `fatal error: <description>` on stdout. The exit
//! status is zero either way, callers only look at the output.

use std::ffi::OsString;

use clap::error::ErrorKind;
use clap::Parser;
use proxydetox_sysproxy::{platform_synchronizer, SyncError, SyncReport};
use tracing_subscriber::EnvFilter;

/// Point the system HTTP/HTTPS proxy at the local Proxydetox engine
#[derive(Parser, Debug)]
#[command(name = "setproxy", version, about)]
struct Args {
    /// Engine port, 0 disables the system proxy
    #[arg(value_parser = clap::value_parser!(u16), allow_negative_numbers = true)]
    port: u16,

    /// Further positional arguments are accepted and ignored
    #[arg(hide = true)]
    _rest: Vec<String>,

    /// Log every step to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Parses the command line, mapping usage errors to [`SyncError::Argument`].
///
/// `--help` and `--version` print and exit as usual.
fn parse_args<I, T>(argv: I) -> Result<Args, SyncError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Args::try_parse_from(argv).map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
        ErrorKind::MissingRequiredArgument => {
            SyncError::Argument("not enough arguments provided".to_string())
        }
        ErrorKind::InvalidValue | ErrorKind::ValueValidation => {
            SyncError::Argument("invalid port".to_string())
        }
        _ => SyncError::Argument(
            e.render()
                .to_string()
                .lines()
                .next()
                .unwrap_or("invalid arguments")
                .trim_start_matches("error: ")
                .to_string(),
        ),
    })
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("setproxy={level},proxydetox_sysproxy={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run<I, T>(argv: I) -> Result<SyncReport, SyncError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = parse_args(argv)?;
    init_logging(args.verbose);

    let report = platform_synchronizer().run(args.port)?;
    for outcome in &report.outcomes {
        if let Some(e) = &outcome.error {
            println!("{}", e);
        }
    }
    Ok(report)
}

fn main() {
    if let Err(e) = run(std::env::args_os()) {
        println!("fatal error: {}", e);
    }
}
