//! Chunkload server CLI
//!
//! ```bash
//! chunkload-server serve                  # Start HTTP server (port 3000)
//! chunkload-server parse input.csv        # Print the preview the server would build
//! ```

use chunkload_backend::server::start_server;
use chunkload_backend::{parse_csv_file_auto, ServerConfig};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "chunkload-server")]
#[command(about = "Session server for chunked CSV uploads", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on (default: CHUNKLOAD_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for partial uploads
        #[arg(long)]
        spool_dir: Option<PathBuf>,
    },

    /// Parse a CSV file and output the preview JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// Rows to include in the preview
        #[arg(long)]
        preview_rows: Option<usize>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env();
    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Serve { port, spool_dir } => {
            let mut config = config;
            if let Some(port) = port {
                config = config.with_port(port);
            }
            if let Some(dir) = spool_dir {
                config = config.with_spool_dir(dir);
            }
            start_server(config).await.map_err(Into::into)
        }

        Commands::Parse {
            input,
            preview_rows,
            output,
        } => cmd_parse(
            &input,
            preview_rows.unwrap_or(config.preview_rows),
            output.as_deref(),
        ),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_parse(
    input: &Path,
    preview_rows: usize,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let parsed = parse_csv_file_auto(input)?;
    eprintln!(
        "   Encoding: {}, delimiter: {:?}",
        parsed.encoding, parsed.delimiter
    );

    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let preview = parsed.into_preview(&name, preview_rows);

    eprintln!("   Columns: {}", preview.columns.join(", "));
    for column in &preview.columns {
        if let Some(t) = preview.column_types.get(column) {
            eprintln!("     {:<24} {}", column, t);
        }
    }
    eprintln!("✅ Parsed {} rows", preview.total_rows);

    let json = serde_json::to_string_pretty(&preview)?;
    write_output(&json, output)?;

    Ok(())
}

fn write_output(content: &str, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            fs::write(path, content)?;
            eprintln!("💾 Saved to: {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
