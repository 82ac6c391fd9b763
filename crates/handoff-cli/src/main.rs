use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod logging;

/// Drive asynchronous foreign operations through the handoff bridge.
///
/// Each command issues one call across the C ABI, waits for the completion
/// callback from the foreign worker thread, and prints the decoded result.
///
/// EXAMPLES:
///     handoff scalar 256                          Square root via the scalar op
///     handoff strings "Hello World"               Echo via the string-list op
///     handoff message --text hi --number 2        Round trip a protobuf message
///     handoff demo                                Run all three scenarios
///     handoff --library ./libops.so scalar 9      Use operations from a shared library
///
/// ENVIRONMENT VARIABLES:
///     HANDOFF_LIBRARY      Shared library exporting the operations
///     HANDOFF_TIMEOUT_MS   Cancel calls that take longer than this
///     HANDOFF_MAX_PENDING  Maximum outstanding calls
///     HANDOFF_LOG          Log filter when RUST_LOG is unset
///     HANDOFF_JSON         Set to '1' for JSON output by default
#[derive(Parser)]
#[command(name = "handoff")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Shared library exporting the three operations (default: built-in natives)
    #[arg(long, global = true, env = "HANDOFF_LIBRARY")]
    library: Option<PathBuf>,

    /// Cancel any call that takes longer than this many milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Directory to start searching for handoff.toml (default: current directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, global = true, env = "HANDOFF_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scalar operation
    ///
    /// EXAMPLES:
    ///     handoff scalar 256     Prints 16.000000
    #[command(visible_alias = "s")]
    Scalar {
        /// Input value
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },

    /// Run the string-list operation
    ///
    /// EXAMPLES:
    ///     handoff strings "Hello World"
    Strings {
        /// Input text (must not contain NUL bytes)
        text: String,
    },

    /// Send a ProcessRequest through the blob operation
    ///
    /// EXAMPLES:
    ///     handoff message --text "Protobuf测试" --number 3.14159 --tag tag1 --tag tag2
    #[command(visible_alias = "m")]
    Message {
        /// Request input_text
        #[arg(long)]
        text: String,
        /// Request number_value
        #[arg(long, allow_negative_numbers = true)]
        number: f64,
        /// Request tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Run the scalar, string-list and message scenarios in sequence
    Demo,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = config::CliOverrides {
        library: cli.library,
        timeout_ms: cli.timeout_ms,
        config_dir: cli.config_dir,
    };
    let settings = config::resolve(overrides)?;
    logging::init(settings.log_filter());

    let bridge = commands::build_bridge(&settings)?;
    let output = commands::Output { json: cli.json };

    let result = match cli.command {
        Commands::Scalar { value } => commands::invoke::scalar(&bridge, value, output),
        Commands::Strings { text } => commands::invoke::strings(&bridge, &text, output),
        Commands::Message { text, number, tags } => {
            commands::invoke::message(&bridge, text, number, tags, output)
        }
        Commands::Demo => commands::demo::run(&bridge, output),
    };

    let drained = bridge.shutdown();
    if drained > 0 {
        tracing::warn!(drained, "calls still pending at exit");
    }
    result
}
