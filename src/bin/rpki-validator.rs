//! The RPKI validator daemon.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use log::{error, info};
use serde::Serialize;
use rpki_validator::config::Config;
use rpki_validator::constants::{
    VALIDATOR_APP, VALIDATOR_DEFAULT_CONFIG_FILE, VALIDATOR_VERSION,
};
use rpki_validator::server::ValidatorServer;
use rpki_validator::server::anchors::AnchorStatus;
use rpki_validator::server::scheduler::Scheduler;


//------------ Options -------------------------------------------------------

/// The command line options for the validator.
#[derive(clap::Parser)]
#[command(
    version,
    about = "Validates RPKI trust anchors and their repositories.",
)]
struct Options {
    /// The config file to use.
    #[arg(
        short, long,
        value_name = "path",
        default_value = VALIDATOR_DEFAULT_CONFIG_FILE,
    )]
    config: PathBuf,

    /// Validate all enabled trust anchors once, print their status and exit.
    #[arg(long)]
    once: bool,
}


//------------ Report --------------------------------------------------------

/// What a single run over all trust anchors prints.
#[derive(Serialize)]
struct Report {
    trust_anchors: Vec<AnchorStatus>,
    as_rankings: usize,
}


//------------ main ----------------------------------------------------------

#[tokio::main]
async fn main() {
    let options = <Options as clap::Parser>::parse();

    let config = match Config::create(&options.config) {
        Ok(config) => Arc::new(config),
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };

    info!("Starting {VALIDATOR_APP} v{VALIDATOR_VERSION}");

    let server = match ValidatorServer::build(config) {
        Ok(server) => Arc::new(server),
        Err(err) => {
            error!("{VALIDATOR_APP} failed to start: {err}");
            process::exit(1);
        }
    };
    let as_rankings = server.rankings().len();
    let scheduler = Scheduler::new(server);

    if options.once {
        let report = Report {
            trust_anchors: scheduler.run_once().await,
            as_rankings,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                error!("Cannot report status: {err}");
                process::exit(1);
            }
        }
    }
    else if let Err(err) = scheduler.run().await {
        error!("{VALIDATOR_APP} failed: {err}");
        process::exit(1);
    }
}
