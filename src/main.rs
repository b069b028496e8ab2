use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use xvizio::format::detect_bytes;
use xvizio::glb::{self, GLB_HEADER_SIZE};
use xvizio::{DirectorySink, Format, WriterOptions, XvizData, XvizFormatWriter};

#[derive(Parser)]
#[command(name = "xviz", about = "XVIZ message conversion tools")]
struct Cli {
    /// Enable debug logging
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert message files and write them as a sequenced entry stream
    Convert {
        /// Target format: glb (default), json, string
        #[arg(short, long, default_value = "glb")]
        format: String,
        /// Output directory, created if missing
        #[arg(short, long)]
        output: PathBuf,
        /// Skip the 0-index.json entry
        #[arg(long)]
        no_index: bool,
        /// Message files, written in the order given
        #[arg(required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// Print the detected format of a file
    Detect {
        input: PathBuf,
    },
    /// Show the header and chunk table of a binary container
    Inspect {
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {

        // ── Convert ──────────────────────────────────────────────────────────
        Commands::Convert { format, output, no_index, input } => {
            let format = parse_format(&format)?;
            let opts = WriterOptions {
                format,
                write_index: !no_index,
                ..WriterOptions::default()
            };
            let sink = DirectorySink::new(&output)?;
            let mut writer = XvizFormatWriter::with_options(sink, opts)?;
            for (index, path) in input.iter().enumerate() {
                let message = XvizData::new(std::fs::read(path)?).map_err(|e| {
                    tracing::warn!(path = %path.display(), "rejected input");
                    e
                })?;
                let key = writer.write_message(index as u64, &message)?;
                println!("  {:<12} {} -> {}", message.format(), path.display(), key);
            }
            writer.close()?;
            println!("Wrote {} frame(s) to {}", writer.frame_count(), output.display());
        }

        // ── Detect ───────────────────────────────────────────────────────────
        Commands::Detect { input } => {
            let bytes = std::fs::read(&input)?;
            println!("{}: {}", input.display(), detect_bytes(&bytes)?);
        }

        // ── Inspect ──────────────────────────────────────────────────────────
        Commands::Inspect { input } => {
            let bytes = std::fs::read(&input)?;
            let layout = glb::inspect(&bytes)?;
            println!("── XVIZ container ───────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Magic          {}", hex::encode(layout.header.magic));
            println!("  Version        {}", layout.header.version);
            println!("  Total length   {} B", layout.header.total_length);
            println!("  Header size    {} B", GLB_HEADER_SIZE);
            println!("  Chunks ({}):", layout.chunks.len());
            println!("    {:<3} {:<5} {:>10} {:>10} {:>10}", "#", "Type", "Offset", "Length", "Physical");
            for (i, chunk) in layout.chunks.iter().enumerate() {
                println!("    {:<3} {:<5} {:>10} {:>10} {:>10}",
                    i, chunk.kind.name(), chunk.data_offset, chunk.length, chunk.physical_size);
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn parse_format(s: &str) -> Result<Format, Box<dyn std::error::Error>> {
    match Format::from_name(s) {
        Some(Format::Object) | None => Err(format!("unknown output format '{s}'").into()),
        Some(f) => Ok(f),
    }
}
