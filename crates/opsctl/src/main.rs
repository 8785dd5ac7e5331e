//! Command line client for opsctld

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use opsctl::Request;
use std::path::PathBuf;
use std::process::ExitCode;
use supervisor_config::DEFAULT_SOCKET_PATH;

#[derive(Parser)]
#[command(name = "opsctl")]
#[command(about = "Start, signal and inspect processes supervised by opsctld")]
#[command(version)]
struct Cli {
    /// Control socket of the daemon
    #[arg(short, long, global = true, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Addresses a service; `--id` wins when both are given
#[derive(Args)]
struct Target {
    /// Service identifier
    #[arg(long, required_unless_present = "pid")]
    id: Option<String>,

    /// Process id
    #[arg(long)]
    pid: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a service and start it
    Start {
        /// Identifier to register under (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Program to run
        #[arg(long = "bin", required_unless_present = "alias", conflicts_with = "alias")]
        binary: Option<String>,

        /// Alias from the daemon's configuration
        #[arg(long)]
        alias: Option<String>,

        /// Environment entry, repeatable
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Working directory of the process
        #[arg(long, default_value = "/")]
        working_dir: String,

        /// Arguments passed to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Deliver a signal such as SIGTERM
    Signal {
        /// Canonical signal name
        signal: String,

        #[command(flatten)]
        target: Target,
    },

    /// Show whether a service is running
    Status {
        #[command(flatten)]
        target: Target,
    },

    /// Print captured output
    Output {
        #[command(flatten)]
        target: Target,
    },

    /// List every service
    List,
}

impl From<Commands> for Request {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Start {
                id,
                binary,
                alias,
                env,
                working_dir,
                args,
            } => Request::Start {
                id,
                binary,
                alias,
                env,
                program_argument: args,
                working_dir,
            },
            Commands::Signal { signal, target } => Request::Signal {
                id: target.id,
                pid: target.pid,
                signal_type: signal,
            },
            Commands::Status { target } => Request::Status {
                id: target.id,
                pid: target.pid,
            },
            Commands::Output { target } => Request::Output {
                id: target.id,
                pid: target.pid,
            },
            Commands::List => Request::List,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    opsctl::logging::init(cli.verbose)?;

    let request = Request::from(cli.command);
    let response = smol::block_on(opsctl::send_request(&cli.socket, &request))
        .with_context(|| format!("Failed to talk to daemon at {}", cli.socket.display()))?;

    if response.is_success() {
        println!("{}", response.message);
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("Error: {}", response.message);
        Ok(ExitCode::FAILURE)
    }
}
