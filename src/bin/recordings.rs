//! recordings - inspect recorded sessions and their metadata

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use capture_kernel::MetadataStore;

#[derive(Parser, Debug)]
#[command(name = "recordings", about = "Inspect recorded sessions and metadata")]
struct Args {
    /// Data directory holding videos, metadata and the index
    #[arg(long, env = "CAPTURE_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the recording history in insertion order
    List {
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the full metadata record for one recording
    Show {
        /// Recording filename (base name is enough)
        #[arg(long)]
        name: String,
    },

    /// Export all metadata records as one JSON array
    Export {
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let store = MetadataStore::open(&args.data_dir)?;

    match args.command {
        Command::List { verbose } => {
            let index = store.index()?;
            for entry in &index.recordings {
                if verbose {
                    println!(
                        "{}  {}  {:.1}s  {}  {} fps",
                        entry.filename,
                        entry.timestamp,
                        entry.duration,
                        entry.resolution,
                        entry.fps
                    );
                } else {
                    println!("{}  {:.1}s", entry.filename, entry.duration);
                }
            }
            println!(
                "{} recordings, {:.1}s total",
                index.total_count, index.total_duration
            );
        }
        Command::Show { name } => {
            let record = store
                .load_metadata(&name)?
                .ok_or_else(|| anyhow!("no metadata for {}", name))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Export { output } => {
            let count = store.export_records(&output)?;
            println!("exported {} records to {}", count, output.display());
        }
    }
    Ok(())
}
