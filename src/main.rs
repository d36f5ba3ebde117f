// TKey TOTP
// Written in 2023 by
//   Andrew Poelstra <icboc@wpsoftware.net>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the CC0 Public Domain Dedication
// along with this software.
// If not, see <http://creativecommons.org/publicdomain/zero/1.0/>.
//

//! # TKey TOTP
//!
//! Command-line utility for the TOTP app on a Tillitis TKey. The secrets live
//! on the key and never leave it unencrypted; this tool only asks the key to
//! store, list, delete and calculate.
//!

mod commands;

use anyhow::Context;
use log::warn;
use std::{env, path::PathBuf, process};
use tkey_totp::{BootstrapConfig, Outcome, UssSource};

/// Exit status for an invocation we could not make sense of
const EXIT_USAGE: i32 = 2;

/// A parsed command line
#[derive(Debug, PartialEq)]
struct Invocation {
    config: BootstrapConfig,
    verbose: bool,
    /// Subcommand and its JSON options
    command: Option<(String, String)>,
}

#[derive(Debug, PartialEq)]
enum Parsed {
    Run(Invocation),
    Help,
    Version,
}

#[derive(Debug, PartialEq)]
enum ArgError {
    /// A flag was malformed; exit 1
    Bad(String),
    /// Something we don't take at all; exit 2
    Unexpected(String),
}

fn flag_value<I: Iterator<Item = String>>(args: &mut I, flag: &str) -> Result<String, ArgError> {
    args.next()
        .ok_or_else(|| ArgError::Bad(format!("{} needs a value", flag)))
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<Parsed, ArgError> {
    let mut config = BootstrapConfig::default();
    let mut verbose = false;
    let mut positional = vec![];

    while let Some(arg) = args.next() {
        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg);
            continue;
        }
        match arg.as_str() {
            "-h" | "--help" => return Ok(Parsed::Help),
            "-v" | "--version" => return Ok(Parsed::Version),
            "--verbose" => verbose = true,
            "-d" | "--port" => config.port = Some(flag_value(&mut args, &arg)?),
            "-s" | "--speed" => {
                let speed = flag_value(&mut args, &arg)?;
                config.speed = speed
                    .parse()
                    .map_err(|_| ArgError::Bad(format!("bad speed {:?}", speed)))?;
            }
            "--app" => config.app_binary = Some(PathBuf::from(flag_value(&mut args, &arg)?)),
            "--uss" | "--uss-file" => {
                if config.uss.is_some() {
                    return Err(ArgError::Bad("--uss and --uss-file are exclusive".into()));
                }
                config.uss = match arg.as_str() {
                    "--uss" => UssSource::Prompt,
                    _ => UssSource::File(PathBuf::from(flag_value(&mut args, &arg)?)),
                };
            }
            s => return Err(ArgError::Bad(format!("unknown flag {}", s))),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next() {
        Some(cmd) => {
            if !commands::is_command(&cmd) {
                return Err(ArgError::Unexpected(format!("unknown command {}", cmd)));
            }
            let options = positional.next().unwrap_or_else(|| "{}".to_owned());
            Some((cmd, options))
        }
        None => None,
    };
    if let Some(extra) = positional.next() {
        return Err(ArgError::Unexpected(format!("unexpected argument {}", extra)));
    }

    Ok(Parsed::Run(Invocation {
        config,
        verbose,
        command,
    }))
}

fn usage(name: &str) {
    eprintln!("Usage: {} [flags] [<command> [<json options>]]", name);
    eprintln!("");
    eprintln!("Flags:");
    eprintln!("    -d, --port <path>     serial device of the TKey");
    eprintln!("    -s, --speed <bps>     line speed (default {})", BootstrapConfig::default().speed);
    eprintln!("    --app <file>          TOTP device app, loaded if the TKey is in firmware mode");
    eprintln!("    --uss                 ask for a User Supplied Secret when loading the app");
    eprintln!("    --uss-file <file>     read the USS from a file (- for stdin)");
    eprintln!("    --verbose             log every frame");
    eprintln!("    -v, --version         print the version");
    eprintln!("    -h, --help            print this message");
    eprintln!("");
    commands::print_commands();
    eprintln!("");
    eprintln!("Without a command, loads the app if needed and reports what is running.");
}

fn run(invocation: Invocation) -> anyhow::Result<()> {
    let config = &invocation.config;
    let port = config.port.as_deref().unwrap_or("(none)");
    let tkey_totp::Session {
        mut app,
        outcome,
        name_version,
    } = tkey_totp::connect(config).with_context(|| format!("connecting to TKey on {}", port))?;

    ctrlc::set_handler(|| {
        eprintln!("Interrupted.");
        process::exit(1);
    })
    .context("installing signal handler")?;

    match outcome {
        Outcome::Loaded => println!("Loaded {} onto the TKey.", name_version),
        Outcome::AlreadyRunning { uss_ignored: true } => {
            println!("{} already running; the USS was not used.", name_version)
        }
        Outcome::AlreadyRunning { uss_ignored: false } => {
            println!("{} already running.", name_version)
        }
    }

    let result = match invocation.command {
        Some((ref cmd, ref options)) => commands::execute(cmd, options, &mut app),
        None => Ok(()),
    };
    if let Err(e) = app.close() {
        warn!("closing connection: {}", e);
    }
    result
}

fn main() {
    let mut args = env::args();
    let name = args.next().unwrap_or_else(|| env!("CARGO_PKG_NAME").to_owned());

    let invocation = match parse_args(args) {
        Ok(Parsed::Run(invocation)) => invocation,
        Ok(Parsed::Help) => {
            usage(&name);
            return;
        }
        Ok(Parsed::Version) => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            return;
        }
        Err(ArgError::Bad(msg)) => {
            eprintln!("{}", msg);
            usage(&name);
            process::exit(1);
        }
        Err(ArgError::Unexpected(msg)) => {
            eprintln!("{}", msg);
            usage(&name);
            process::exit(EXIT_USAGE);
        }
    };

    let default_filter = if invocation.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(invocation) {
        eprintln!("Error: {:?}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Parsed, ArgError> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    fn run_of(args: &[&str]) -> Invocation {
        match parse(args) {
            Ok(Parsed::Run(inv)) => inv,
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn flags() {
        let inv = run_of(&["-d", "/dev/ttyACM0", "--speed", "9600", "--verbose", "--app", "totp.bin"]);
        assert_eq!(inv.config.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(inv.config.speed, 9600);
        assert_eq!(inv.config.app_binary, Some(PathBuf::from("totp.bin")));
        assert!(inv.verbose);
        assert_eq!(inv.command, None);

        let inv = run_of(&[]);
        assert_eq!(inv.config, BootstrapConfig::default());
        assert!(!inv.verbose);

        assert_eq!(run_of(&["--uss"]).config.uss, UssSource::Prompt);
        assert_eq!(
            run_of(&["--uss-file", "-"]).config.uss,
            UssSource::File(PathBuf::from("-"))
        );
        assert_eq!(parse(&["-h"]), Ok(Parsed::Help));
        assert_eq!(parse(&["--port", "x", "-v"]), Ok(Parsed::Version));
    }

    #[test]
    fn commands_and_options() {
        let inv = run_of(&["-d", "p", "list"]);
        assert_eq!(inv.command, Some(("list".to_owned(), "{}".to_owned())));
        let inv = run_of(&["calc", "{\"index\": 2}", "-d", "p"]);
        assert_eq!(inv.command, Some(("calc".to_owned(), "{\"index\": 2}".to_owned())));
    }

    #[test]
    fn bad_invocations() {
        assert!(matches!(parse(&["frobnicate"]), Err(ArgError::Unexpected(_))));
        assert!(matches!(parse(&["list", "{}", "extra"]), Err(ArgError::Unexpected(_))));
        assert!(matches!(parse(&["--speed", "fast"]), Err(ArgError::Bad(_))));
        assert!(matches!(parse(&["--port"]), Err(ArgError::Bad(_))));
        assert!(matches!(parse(&["--uss", "--uss-file", "f"]), Err(ArgError::Bad(_))));
        assert!(matches!(parse(&["--bogus"]), Err(ArgError::Bad(_))));
    }
}
