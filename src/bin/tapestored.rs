//! The tapestore server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use tapestore::logger::{self, Level};
use tapestore::rpc::server::{self, Router};
use tapestore::store::tape::DeviceMode;
use tapestore::store::{self, RunOptions};
use tapestore::{config, shutdown, sim, Error, Result};

#[derive(Parser)]
#[command(name = "tapestored", version)]
#[command(about = "Tape library storage server")]
struct Cli {
    /// Client configuration file (accepted for flag parity, unused)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server configuration file
    #[arg(long, default_value = "/etc/tapestore/server.yaml")]
    serverconfig: PathBuf,

    /// Address for incoming network connections
    #[arg(long, default_value = "0.0.0.0:8080")]
    http: String,

    /// Level of logging
    #[arg(long, value_enum, default_value = "info")]
    log: Level,

    /// Enable simulation of operations
    #[arg(long)]
    simulate: bool,

    /// Enable emulation of devices
    #[arg(long = "emulate-dev")]
    emulate_dev: bool,

    /// Reset the inventory database
    #[arg(long)]
    dbreset: bool,

    /// Perform an inventory audit when initializing
    #[arg(long)]
    audit: bool,
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    if let Err(e) = logger::init(args.log) {
        eprintln!("tapestored: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(args).await {
        error!("tapestored: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Cli) -> Result<()> {
    info!("tapestored: starting");

    if args.simulate {
        info!("tapestored: simulation enabled");
        sim::enable();
    }

    if let Some(path) = &args.config {
        debug!("tapestored: ignoring client configuration file {}", path.display());
    }

    info!(
        "tapestored: server configuration file: {}",
        args.serverconfig.display()
    );

    let cfg = config::load_server(&args.serverconfig)?;

    let opts = RunOptions {
        reset_db: args.dbreset,
        audit: args.audit,
        device_mode: if args.emulate_dev {
            DeviceMode::Emulated
        } else {
            DeviceMode::Real
        },
    };

    let mut router = Router::new();

    for (name, store_cfg) in &cfg.stores {
        let st = store::create(name, store_cfg, &opts)?;

        let for_shutdown = Arc::clone(&st);
        shutdown::handle(move || for_shutdown.stop());

        router.add_store(st);

        info!("tapestored: store {name} ready");
    }

    let listener = TcpListener::bind(&args.http)
        .await
        .map_err(|e| Error::from(e).op("tapestored.run"))?;

    info!("tapestored: serving on {}", args.http);

    let router = Arc::new(router);

    tokio::select! {
        res = server::serve(router, listener) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("tapestored: interrupt received; shutting down");
            shutdown::now(0);
        }
    }
}
