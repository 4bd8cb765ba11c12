//! Cellar CLI
//!
//! Inspect, scan and append to a log folder.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use cellar::{CellarError, Config, Reader, Result, Writer};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// Cellar CLI
#[derive(Parser, Debug)]
#[command(name = "cellar-cli")]
#[command(about = "Inspect and operate a cellar record log")]
#[command(version)]
struct Args {
    /// Log folder
    #[arg(short, long, default_value = "./cellar_data")]
    folder: PathBuf,

    /// Encryption key, hex encoded (16, 24 or 32 bytes)
    #[arg(short, long)]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show committed buffer state and statistics
    Stats,

    /// List sealed chunks
    Chunks,

    /// Print records, one per line
    Scan {
        /// First position to read (must be a record boundary)
        #[arg(long, default_value = "0")]
        start: i64,

        /// Skip segments starting after this position (0 = unbounded)
        #[arg(long, default_value = "0")]
        end: i64,

        /// Read only the first N chunks (0 = all)
        #[arg(long, default_value = "0")]
        limit_chunks: usize,

        /// Skip the active buffer
        #[arg(long)]
        no_buffer: bool,

        /// Print payloads as hex
        #[arg(long)]
        hex: bool,
    },

    /// Append one record per stdin line, then checkpoint
    Append {
        /// Active buffer capacity in bytes
        #[arg(short = 'b', long, default_value_t = cellar::config::DEFAULT_MAX_BUFFER_SIZE)]
        max_buffer_size: i64,
    },

    /// Read or write a named user checkpoint
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

#[derive(Subcommand, Debug)]
enum CheckpointAction {
    /// Print the position stored under NAME (0 if unset)
    Get { name: String },

    /// Store POS under NAME
    Put { name: String, pos: i64 },
}

fn main() {
    // Logs go to stderr; stdout carries records
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cellar=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let key = hex::decode(&args.key)
        .map_err(|e| CellarError::Config(format!("key is not valid hex: {}", e)))?;

    match args.command {
        Commands::Stats => {
            let snapshot = Reader::new(&args.folder, key).snapshot()?;
            let stats = snapshot.stats.unwrap_or_default();
            match snapshot.buffer {
                Some(b) => println!(
                    "buffer {} start={} pos={} max={} records={}",
                    b.file_name, b.start_pos, b.pos, b.max_bytes, b.records
                ),
                None => println!("buffer <none>"),
            }
            println!("chunks {}", snapshot.chunks.len());
            println!("max_key_size {}", stats.max_key_size);
            println!("max_val_size {}", stats.max_val_size);
        }

        Commands::Chunks => {
            for c in Reader::new(&args.folder, key).chunks()? {
                println!(
                    "{} start={} size={} disk={} records={} crc={:08x}",
                    c.file_name,
                    c.start_pos,
                    c.uncompressed_byte_size,
                    c.compressed_disk_size,
                    c.records,
                    c.checksum
                );
            }
        }

        Commands::Scan {
            start,
            end,
            limit_chunks,
            no_buffer,
            hex: as_hex,
        } => {
            let reader = Reader::new(&args.folder, key)
                .start_pos(start)
                .end_pos(end)
                .limit_chunks(limit_chunks)
                .include_buffer(!no_buffer)
                .verbose_chunk_log(true);

            let stdout = io::stdout();
            let mut out = stdout.lock();
            reader.scan(|info, data| {
                if as_hex {
                    writeln!(out, "{}\t{}", info.start_pos, hex::encode(data))
                } else {
                    writeln!(out, "{}\t{}", info.start_pos, String::from_utf8_lossy(data))
                }
            })?;
        }

        Commands::Append { max_buffer_size } => {
            let config = Config::builder()
                .folder(&args.folder)
                .max_buffer_size(max_buffer_size)
                .key(key)
                .build();
            let mut writer = Writer::open(config)?;

            let stdin = io::stdin();
            let mut appended = 0u64;
            for line in stdin.lock().lines() {
                writer.append(line?.as_bytes())?;
                appended += 1;
            }

            let pos = writer.checkpoint()?;
            writer.close()?;
            tracing::info!(records = appended, pos, "Appended");
        }

        Commands::Checkpoint { action } => match action {
            CheckpointAction::Get { name } => {
                let pos = Reader::new(&args.folder, key).user_checkpoint(&name)?;
                println!("{}", pos);
            }
            CheckpointAction::Put { name, pos } => {
                let config = Config::builder().folder(&args.folder).key(key).build();
                let writer = Writer::open(config)?;
                writer.put_user_checkpoint(&name, pos)?;
                writer.close()?;
            }
        },
    }

    Ok(())
}
