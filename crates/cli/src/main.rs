//! Prebid fan-out CLI.
//!
//! This tool provides commands for:
//! - Validating settings files
//! - Fanning a bid request file out into per-bidder requests for inspection

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod config;
mod error;
mod fanout;
mod logging;

use error::CliError;
use prebid_fanout_common::fanout::RequestType;

#[derive(Parser)]
#[command(name = "pfcli")]
#[command(about = "Prebid fan-out CLI for settings validation and request inspection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Fan a bid request out into per-bidder requests and print them as JSON
    Fanout {
        /// Path to the OpenRTB bid request JSON file
        #[arg(long, short)]
        request: PathBuf,

        /// Path to the TOML settings file (defaults apply when omitted)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Raw `Cookie` header carrying the `uids` cookie
        #[arg(long, env = "PREBID_FANOUT_UIDS_COOKIE")]
        uids_cookie: Option<String>,

        /// Endpoint the request is treated as arriving on
        #[arg(long, value_enum, default_value = "web")]
        request_type: RequestTypeArg,

        /// Publisher (account) id used for privacy overrides
        #[arg(long, default_value = "")]
        pub_id: String,

        /// Also show the HTTP calls each configured adapter would make
        #[arg(long)]
        with_adapters: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate settings against the schema and range checks
    Validate {
        /// Path to the TOML configuration file
        #[arg(long, short)]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum RequestTypeArg {
    Web,
    App,
    Video,
    Amp,
}

impl From<RequestTypeArg> for RequestType {
    fn from(arg: RequestTypeArg) -> Self {
        match arg {
            RequestTypeArg::Web => RequestType::OpenRtb2Web,
            RequestTypeArg::App => RequestType::OpenRtb2App,
            RequestTypeArg::Video => RequestType::Video,
            RequestTypeArg::Amp => RequestType::Amp,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Validate { file } => config::validate(&file, cli.verbose),
        },
        Commands::Fanout {
            request,
            config,
            uids_cookie,
            request_type,
            pub_id,
            with_adapters,
        } => fanout::run(&fanout::FanoutArgs {
            request,
            config,
            uids_cookie,
            request_type: request_type.into(),
            pub_id,
            with_adapters,
        }),
    }
}
