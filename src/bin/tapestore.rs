//! The tapestore client: push and pull named byte streams.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use tapestore::client::{Client, DEFAULT_ADDR, DEFAULT_STORE};
use tapestore::logger::{self, Level};
use tapestore::{config, Result};

#[derive(Parser)]
#[command(name = "tapestore", version)]
#[command(about = "Tape library storage client")]
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
    /// Store a file on the server
    Push {
        /// Input file (defaults to standard input)
        #[arg(long = "in")]
        input: Option<PathBuf>,

        /// Append data to a previously stored file
        #[arg(long, conflicts_with = "resume")]
        append: bool,

        /// Resume an interrupted push
        #[arg(long)]
        resume: bool,

        /// Name to store the data under
        name: String,
    },

    /// Retrieve a file from the server
    Pull {
        /// Output file (defaults to standard output)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Resume an interrupted pull
        #[arg(long, requires = "out")]
        resume: bool,

        /// Path to retrieve
        path: String,
    },
}

fn main() {
    let args = Cli::parse();

    if let Err(e) = logger::init(args.log) {
        eprintln!("tapestore: {e}");
        std::process::exit(1);
    }

    let verb = match args.command {
        Commands::Push { .. } => "push",
        Commands::Pull { .. } => "pull",
    };

    if let Err(e) = run(args) {
        eprintln!("tapestore: {verb}: {e}");
        std::process::exit(1);
    }
}

fn run(args: Cli) -> Result<()> {
    let (addr, store) = resolve_target(&args)?;
    let client = Client::new(&addr, &store);

    match args.command {
        Commands::Push {
            input,
            append,
            resume,
            name,
        } => {
            let mut input: Box<dyn Read> = match input {
                Some(path) => Box::new(fs::File::open(path)?),
                None => Box::new(io::stdin()),
            };

            if resume {
                // advance the reader past what the server already has,
                // then append the rest
                let info = client.stat(&name)?;
                io::copy(&mut (&mut input).take(info.size as u64), &mut io::sink())?;

                return client.push(&name, input, true);
            }

            client.push(&name, input, append)
        }

        Commands::Pull { out, resume, path } => {
            let (mut out, offset): (Box<dyn Write>, i64) = match out {
                Some(p) if resume => {
                    let f = fs::OpenOptions::new().append(true).open(&p)?;
                    let offset = f.metadata()?.len() as i64;
                    (Box::new(f), offset)
                }
                Some(p) => (Box::new(fs::File::create(&p)?), 0),
                None => (Box::new(io::stdout()), 0),
            };

            client.pull(&path, &mut out, offset)
        }
    }
}

fn resolve_target(args: &Cli) -> Result<(String, String)> {
    let mut addr = args.addr.clone();
    let mut store = args.store.clone();

    if let Some(path) = &args.config {
        let cfg = config::load_client(path)?;

        // explicit flags win over the configuration file
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

    Ok((addr, store))
}
