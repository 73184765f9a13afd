//! The tapestore administration tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use tapestore::client::{Client, DEFAULT_ADDR, DEFAULT_STORE};
use tapestore::logger::{self, Level};
use tapestore::store::tape::format_volume_flags;
use tapestore::{config, Result};

#[derive(Parser)]
#[command(name = "tapestoreadm", version)]
#[command(about = "Tape library storage administration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server address
    #[arg(long, global = true, default_value = DEFAULT_ADDR)]
    addr: String,

    /// Store to target
    #[arg(long, global = true, default_value = DEFAULT_STORE)]
    store: String,

    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Level of logging
    #[arg(long, global = true, value_enum, default_value = "warning")]
    log: Level,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a list of known volumes
    Vol {
        /// Long format
        #[arg(short = 'l')]
        long: bool,
    },
}

fn main() {
    let args = Cli::parse();

    if let Err(e) = logger::init(args.log) {
        eprintln!("tapestoreadm: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(args) {
        eprintln!("tapestoreadm: vol: {e}");
        std::process::exit(1);
    }
}

fn run(args: Cli) -> Result<()> {
    let mut addr = args.addr.clone();
    let mut store = args.store.clone();

    if let Some(path) = &args.config {
        let cfg = config::load_client(path)?;

        if addr == DEFAULT_ADDR {
            if let Some(a) = cfg.addr {
                addr = a;
            }
        }
        if store == DEFAULT_STORE {
            if let Some(s) = cfg.store {
                store = s;
            }
        }
    }

    let client = Client::new(&addr, &store);

    match args.command {
        Commands::Vol { long } => {
            let vols = client.volumes()?;

            if !long {
                for vol in vols {
                    println!("{}", vol.serial);
                }
                return Ok(());
            }

            println!(
                "{:<10} {:<10} {:>6} {:>6} {:<12} {}",
                "SERIAL", "SLOT", "ADDR", "HOME", "CATEGORY", "FLAGS"
            );

            for vol in vols {
                let (slot, vaddr) = match vol.location {
                    Some(loc) => (loc.category.to_string(), loc.addr.to_string()),
                    None => ("-".to_string(), "-".to_string()),
                };

                let home = match vol.home {
                    Some(home) => home.addr.to_string(),
                    None => String::new(),
                };

                println!(
                    "{:<10} {:<10} {:>6} {:>6} {:<12} {}",
                    vol.serial.as_str(),
                    slot,
                    vaddr,
                    home,
                    vol.category.to_string(),
                    format_volume_flags(vol.flags)
                );
            }

            Ok(())
        }
    }
}
