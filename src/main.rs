// ==============================================================================
// `protoc-gen-outline`: Plugin Binary for the Outline Backend
// ==============================================================================
//
// Invoked by the compiler as `protoc --outline_out=DIR --outline_opt=...`. The
// request arrives on stdin and the response leaves on stdout, so diagnostics
// and logs go to stderr only.
//
// Exit status is 0 whenever a response was written, including responses that
// carry an error. It is nonzero only for bad command-line arguments or a
// failed channel.

use std::process::ExitCode;

use lexopt::prelude::*;
use miette::{Context, IntoDiagnostic};
use tracing_subscriber::EnvFilter;

use protoc_plugin::outline::OutlineGenerator;

const LOG_ENV: &str = "PROTOC_GEN_OUTLINE_LOG";

const USAGE: &str = "\
protoc-gen-outline: protoc plugin that emits type outlines

Usage: protoc --plugin=protoc-gen-outline --outline_out=DIR [--outline_opt=OPTIONS] FILES

Reads a CodeGeneratorRequest on stdin and writes a CodeGeneratorResponse to
stdout. It is not meant to be run by hand.

Options (passed through --outline_opt, comma-separated):
  suffix=EXT         output extension (default: out)
  markers            emit @@protoc_insertion_point markers
  insert_into=TAG    write into marker TAG instead of creating the file
  format=text|json   output format (default: text)
  fields             list fields, enum values and methods

Environment:
  PROTOC_GEN_OUTLINE_LOG   log filter for stderr (default: warn)

Flags:
  -h, --help       print this help
  -V, --version    print version";

enum Mode {
    Serve,
    Help,
    Version,
}

fn main() -> miette::Result<ExitCode> {
    miette::set_hook(Box::new(|_| {
        Box::new(miette::MietteHandlerOpts::new().build())
    }))?;

    let mode = match parse_args() {
        Ok(mode) => mode,
        Err(e) => {
            // Same shape as protoc's own plugin main: complain and exit 1.
            eprintln!("protoc-gen-outline: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    match mode {
        Mode::Help => println!("{USAGE}"),
        Mode::Version => println!("protoc-gen-outline {}", env!("CARGO_PKG_VERSION")),
        Mode::Serve => {
            init_logging();
            protoc_plugin::plugin_main(&OutlineGenerator)
                .into_diagnostic()
                .wrap_err("exchange request and response with the compiler")?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn parse_args() -> Result<Mode, lexopt::Error> {
    let mut parser = lexopt::Parser::from_env();
    let mut mode = Mode::Serve;
    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => mode = Mode::Help,
            Short('V') | Long("version") => mode = Mode::Version,
            other => {
                return Err(lexopt::Error::Custom(
                    format!("Unknown option: {}", arg_display(&other)).into(),
                ));
            }
        }
    }
    Ok(mode)
}

fn arg_display(arg: &lexopt::Arg<'_>) -> String {
    match arg {
        Short(c) => format!("-{c}"),
        Long(name) => format!("--{name}"),
        Value(value) => value.to_string_lossy().into_owned(),
    }
}

/// Logs go to stderr; stdout belongs to the protocol.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();
}
