//! BurrowKV CLI
//!
//! Opens a store in-process to inspect or maintain it.

use burrowkv::index::Index;
use burrowkv::wal::Replay;
use burrowkv::{BurrowError, Config, Engine};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// BurrowKV CLI
#[derive(Parser, Debug)]
#[command(name = "burrowkv")]
#[command(about = "Inspect and maintain a BurrowKV store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./burrowkv_data")]
    data_dir: String,

    /// Store id inside the data directory
    #[arg(short, long, default_value = "default")]
    store: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Remove a key
    Remove {
        /// The key to remove
        key: String,
    },

    /// Merge a JSON object into the value at a key
    Merge {
        key: String,

        /// JSON object to merge in
        delta: String,
    },

    /// List every key, sorted
    Keys,

    /// Remove every key
    Clear,

    /// Rewrite the log to hold only live keys
    Compact,

    /// Check the log for damage without modifying it
    Verify,

    /// Print store counters
    Stats,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,burrowkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), BurrowError> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .store_id(&args.store)
        .build();

    let command = match args.command {
        // Verify must see the log as it is, before recovery truncates anything
        Commands::Verify => return verify(config),
        command => command,
    };

    let engine = Engine::open(config)?;

    match command {
        Commands::Get { key } => match engine.get(&key)? {
            Some(value) => println!("{}", value),
            None => {
                eprintln!("(absent)");
            }
        },
        Commands::Set { key, value } => engine.set(&key, &value)?,
        Commands::Remove { key } => engine.remove(&key)?,
        Commands::Merge { key, delta } => println!("{}", engine.merge_item(&key, &delta)?),
        Commands::Keys => {
            for key in engine.all_keys()?.to_sorted_vec() {
                println!("{}", key);
            }
        }
        Commands::Clear => engine.clear()?,
        Commands::Compact => {
            let before = engine.stats();
            engine.compact()?;
            let after = engine.stats();
            println!(
                "segments: {} -> {}, keys: {}",
                before.segments, after.segments, after.keys
            );
        }
        Commands::Stats => {
            let stats = engine.stats();
            println!("keys:                 {}", stats.keys);
            println!("index bytes:          {}", stats.index_bytes);
            println!("segments:             {}", stats.segments);
            println!("active segment bytes: {}", stats.active_segment_bytes);
            println!("last sequence:        {}", stats.last_sequence);
        }
        Commands::Verify => {}
    }

    engine.close()
}

fn verify(config: Config) -> Result<(), BurrowError> {
    config.validate()?;
    let dir = config.store_dir();

    let segments = match burrowkv::wal::Manifest::load(&dir)? {
        Some(manifest) => manifest.segments,
        None => {
            println!("no manifest in {}", dir.display());
            return Ok(());
        }
    };

    let report = burrowkv::wal::LogRecovery::verify(&dir, &segments)?;
    let live = Index::from_records(Replay::new(&dir, segments.clone()));
    println!("segments:          {}", segments.len());
    println!("live keys:         {}", live.len());
    println!("records recovered: {}", report.records_recovered);
    println!("records corrupted: {}", report.records_corrupted);
    println!("last sequence:     {}", report.last_sequence);
    println!("truncated bytes:   {}", report.truncated_bytes);
    println!("dropped segments:  {:?}", report.dropped_segments);
    println!("status:            {}", if report.was_truncated { "DAMAGED" } else { "ok" });
    Ok(())
}
