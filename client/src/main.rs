//! Chunkload CLI - validate, inspect and upload CSV files
//!
//! ```bash
//! chunkload validate a.csv b.csv          # Structural check, exit 1 if not uploadable
//! chunkload analyze a.csv                 # Column statistics of a local file
//! chunkload upload a.csv b.csv            # Chunked upload to a chunkload server
//! ```
//!
//! Settings come from `CHUNKLOAD_*` variables (or a `.env` file) and can be
//! overridden by flags. Logs go to stderr, filtered by `RUST_LOG`.

use chunkload::{
    analyze_columns, read_table, upload_batch, validate_source, ClientError, ClientResult,
    ClientSettings, ColumnStats, HttpTransport, LocalFile, Row, UploadOrchestrator,
    UploadState, ValidationResult,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chunkload")]
#[command(about = "Resilient chunked uploads for CSV files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that files are usable CSV before uploading them
    Validate {
        /// Files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show column statistics of a local CSV file
    Analyze {
        /// Input CSV file
        input: PathBuf,

        /// Number of rows to print
        #[arg(short, long, default_value = "5")]
        rows: usize,
    },

    /// Upload files to a chunkload server, one after another
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Server base URL
        #[arg(short, long)]
        server: Option<String>,

        /// Chunk size in bytes
        #[arg(long)]
        chunk_size: Option<u64>,

        /// Attempts per chunk
        #[arg(long)]
        max_retries: Option<u32>,

        /// Delay between attempts in milliseconds
        #[arg(long)]
        retry_delay_ms: Option<u64>,

        /// Skip fetching the preview after each upload
        #[arg(long)]
        no_preview: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chunkload=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { files } => cmd_validate(&files).await,

        Commands::Analyze { input, rows } => cmd_analyze(input, rows).await,

        Commands::Upload {
            files,
            server,
            chunk_size,
            max_retries,
            retry_delay_ms,
            no_preview,
        } => {
            let mut settings = ClientSettings::from_env();
            if let Some(server) = server {
                settings.server_url = server;
            }
            if let Some(chunk_size) = chunk_size {
                settings.upload = settings.upload.with_chunk_size(chunk_size);
            }
            if let Some(max_retries) = max_retries {
                settings.upload = settings.upload.with_max_retries(max_retries);
            }
            if let Some(delay) = retry_delay_ms {
                settings.upload = settings.upload.with_retry_delay_ms(delay);
            }
            cmd_upload(&files, settings, !no_preview).await
        }
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_validate(files: &[PathBuf]) -> ClientResult<()> {
    let mut rejected = 0;

    for path in files {
        let result = match LocalFile::open(path).await {
            Ok(file) => validate_source(&file).await,
            Err(e) => {
                eprintln!("❌ {}: {}", path.display(), e);
                rejected += 1;
                continue;
            }
        };

        if !chunkload::is_uploadable(&result) {
            rejected += 1;
        }
        print_validation(&path.display().to_string(), &result);
    }

    if rejected > 0 {
        return Err(ClientError::Failed(format!(
            "{} of {} file(s) cannot be uploaded",
            rejected,
            files.len()
        )));
    }
    Ok(())
}

fn print_validation(name: &str, result: &ValidationResult) {
    match result {
        ValidationResult::Invalid { error } => eprintln!("❌ {}: {}", name, error),
        ValidationResult::Valid { warnings } if warnings.is_empty() => {
            eprintln!("✅ {}", name)
        }
        ValidationResult::Valid { .. } => {
            let icon = if chunkload::is_uploadable(result) { "⚠️ " } else { "❌" };
            let labels: Vec<String> = result.warnings().map(|w| w.to_string()).collect();
            eprintln!("{} {} ({})", icon, name, labels.join(", "));
        }
    }
}

async fn cmd_analyze(input: PathBuf, rows: usize) -> ClientResult<()> {
    eprintln!("📄 Analyzing: {}", input.display());

    let table = read_table(&input).await?;
    eprintln!("   Columns: {}", table.columns.join(", "));
    eprintln!("   Rows: {}", table.rows.len());

    let stats = analyze_columns(&table.columns, &table.rows);
    print_columns(&stats);
    print_rows(&table.columns, &table.rows, rows);

    Ok(())
}

async fn cmd_upload(files: &[PathBuf], settings: ClientSettings, fetch_preview: bool) -> ClientResult<()> {
    let mut sources = Vec::new();
    let mut unreadable = 0;
    for path in files {
        match LocalFile::open(path).await {
            Ok(file) => sources.push(file),
            Err(e) => {
                eprintln!("❌ {}: {}", path.display(), e);
                unreadable += 1;
            }
        }
    }

    eprintln!("🚀 Uploading to {}", settings.server_url);
    let transport = HttpTransport::new(&settings.server_url);
    let orchestrator =
        UploadOrchestrator::new(transport.clone(), settings.upload.clone()).with_observer(print_state);

    let stop = CancellationToken::new();
    let handle = orchestrator.cancel_handle();
    let ctrl_c = {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n🛑 Cancelling...");
                stop.cancel();
                handle.cancel();
            }
        })
    };

    let report = upload_batch(&orchestrator, &sources, &stop).await;
    ctrl_c.abort();

    for skipped in &report.skipped {
        print_validation(&skipped.file, &skipped.validation);
    }

    if fetch_preview && !report.cancelled {
        for completed in &report.completed {
            match transport.fetch_preview(&completed.session_id, &stop).await {
                Ok(preview) => {
                    eprintln!(
                        "\n📊 {} ({} rows, session {})",
                        completed.file, preview.total_rows, preview.session_id
                    );
                    for column in &preview.columns {
                        if let Some(t) = preview.column_types.get(column) {
                            eprintln!("   {:<24} {}", column, t);
                        }
                    }
                    print_columns(&analyze_columns(&preview.columns, &preview.rows));
                }
                Err(e) => eprintln!("⚠️  No preview for {}: {}", completed.file, e),
            }
        }
    }

    eprintln!(
        "\n✨ {} uploaded, {} failed, {} skipped{}",
        report.completed.len(),
        report.failed.len(),
        report.skipped.len() + unreadable,
        if report.cancelled { ", cancelled" } else { "" }
    );

    if report.is_success() && unreadable == 0 {
        Ok(())
    } else if report.cancelled {
        Err(ClientError::Failed("Upload cancelled".to_string()))
    } else {
        Err(ClientError::Failed("Some files were not uploaded".to_string()))
    }
}

fn print_state(state: &UploadState) {
    match state {
        UploadState::Validating { file } => {
            eprintln!("📄 {} ({} bytes)", file.name, file.size)
        }
        UploadState::Uploading {
            chunks_completed,
            chunks_total,
            ..
        } => {
            let percent = state.progress_percent().unwrap_or(0.0);
            eprintln!(
                "   ⬆️  {:>5.1}% ({}/{} chunks)",
                percent, chunks_completed, chunks_total
            );
        }
        UploadState::Finalizing { .. } => eprintln!("   ⚙️  Finalizing..."),
        UploadState::Done { session_id } => eprintln!("   ✅ Done (session {})", session_id),
        UploadState::Error {
            message, retryable, ..
        } => {
            let hint = if *retryable { " (retryable)" } else { "" };
            eprintln!("   ❌ {}{}", message, hint);
        }
        UploadState::Idle => eprintln!("   ⏹️  Idle"),
    }
}

fn print_columns(stats: &[ColumnStats]) {
    eprintln!("\n   {:<24} {:<8} {:>7}  samples", "column", "type", "empty");
    for column in stats {
        let range = column
            .numeric_range
            .map(|r| format!(" [{} .. {}]", r.min, r.max))
            .unwrap_or_default();
        eprintln!(
            "   {:<24} {:<8} {:>3}/{:<3}  {}{}",
            column.name,
            column.inferred_type,
            column.empty_count,
            column.total_count,
            column.sample_values.join(", "),
            range
        );
        for warning in &column.warnings {
            eprintln!("   ⚠️  {}: {}", column.name, warning);
        }
    }
}

fn print_rows(columns: &[String], rows: &[Row], limit: usize) {
    if limit == 0 || rows.is_empty() {
        return;
    }
    eprintln!();
    println!("{}", columns.join("\t"));
    for row in rows.iter().take(limit) {
        let values: Vec<&str> = columns
            .iter()
            .map(|c| row.get(c).map(String::as_str).unwrap_or(""))
            .collect();
        println!("{}", values.join("\t"));
    }
}
