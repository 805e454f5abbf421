//! Main entry point for the worker binary
//!
//! Spawned by the coordinator once per worker VM; never started by hand.

use clap::Parser;

use fleet::child::{self, LaunchParams, TaskRegistry};
use shared::{logging, ProcessId};

#[tokio::main]
async fn main() {
    let params = LaunchParams::parse();

    if let Err(e) = child::run(params, TaskRegistry::with_builtins()).await {
        logging::log_error(ProcessId::current(), "Worker startup", &e);
        std::process::exit(1);
    }
}
