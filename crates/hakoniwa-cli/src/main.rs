//! hakoniwa binary.
//!
//! Replays a JSON-lines request script against an in-memory session and
//! prints one JSON reply per request.
//!
//! Usage:
//!   # Seed /go from a host toolchain, provide main.go, run a script
//!   hakoniwa --seed-dir ./goroot --seed-prefix /go \
//!       --file main.go --script build.jsonl --output a.out
//!
//!   # Read requests from stdin
//!   echo '{"op":"readdir","path":"/"}' | hakoniwa

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hakoniwa_vfs::{Request, RunSpec, SeedFiles, Session, SessionConfig, TracingSink, dispatch};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod dir_seed;

use dir_seed::DirSeed;

/// Replay guest filesystem requests against a sandboxed session.
#[derive(Parser, Debug)]
#[command(name = "hakoniwa")]
#[command(about = "In-memory filesystem session for sandboxed guests")]
struct Args {
    /// Session configuration (RON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host directory to seed the session from on first use
    #[arg(long)]
    seed_dir: Option<PathBuf>,

    /// Guest directory the seed directory is mirrored under
    #[arg(long, default_value = "/")]
    seed_prefix: String,

    /// Guest working directory for the run
    #[arg(long, default_value = "/root/run")]
    dir: String,

    /// Host files copied into the run directory (by file name)
    #[arg(long = "file")]
    files: Vec<PathBuf>,

    /// JSON-lines request script (defaults to stdin)
    #[arg(long)]
    script: Option<PathBuf>,

    /// Run-directory files to export after the script
    #[arg(long = "output")]
    outputs: Vec<String>,

    /// Host directory exported outputs are written to
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(file) => SessionConfig::load(file)
            .with_context(|| format!("loading config {}", file.display()))?,
        None => SessionConfig::default(),
    };

    let mut session = Session::new(&config)?;
    if let Some(root) = &args.seed_dir {
        session = session.with_seed(Arc::new(DirSeed::new(root, &args.seed_prefix)));
    }

    let inputs = read_inputs(&args.files).await?;
    let run = session
        .start_run(RunSpec::new(&args.dir, inputs, Box::new(TracingSink::new())))
        .await
        .context("starting run")?;

    let failed = match &args.script {
        Some(file) => {
            let f = tokio::fs::File::open(file)
                .await
                .with_context(|| format!("opening script {}", file.display()))?;
            replay(&session, BufReader::new(f)).await?
        }
        None => replay(&session, BufReader::new(tokio::io::stdin())).await?,
    };

    let output = session.finish_run(run, args.outputs.as_slice()).await?;
    export(&args.out_dir, &output.files).await?;

    tracing::info!(failed, exported = output.files.len(), "done");
    Ok(())
}

/// Load host files into a flat name → content map.
async fn read_inputs(files: &[PathBuf]) -> Result<SeedFiles> {
    let mut inputs = SeedFiles::new();
    for file in files {
        let name = file
            .file_name()
            .with_context(|| format!("input has no file name: {}", file.display()))?
            .to_string_lossy()
            .into_owned();
        let content = tokio::fs::read(file)
            .await
            .with_context(|| format!("reading input {}", file.display()))?;
        inputs.insert(name, content);
    }
    Ok(inputs)
}

/// Dispatch each request line and print its reply. Returns how many
/// requests failed.
async fn replay<R: AsyncBufRead + Unpin>(session: &Session, reader: R) -> Result<usize> {
    let mut lines = reader.lines();
    let mut stdout = tokio::io::stdout();
    let mut line_no = 0usize;
    let mut failed = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let req: Request = serde_json::from_str(line)
            .with_context(|| format!("script line {}: bad request", line_no))?;
        let reply = dispatch(session, req).await;
        if !reply.is_ok() {
            failed += 1;
        }
        let mut text = serde_json::to_string(&reply)?;
        text.push('\n');
        stdout.write_all(text.as_bytes()).await?;
    }
    stdout.flush().await?;
    Ok(failed)
}

async fn export(out_dir: &Path, files: &SeedFiles) -> Result<()> {
    if files.is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("creating {}", out_dir.display()))?;
    for (name, content) in files {
        let target = out_dir.join(name);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content)
            .await
            .with_context(|| format!("writing {}", target.display()))?;
        tracing::info!(name = %name, bytes = content.len(), "exported");
    }
    Ok(())
}
