use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use pagetear::critique::NullCritique;
use pagetear::job::{run_teardown, PipelineConfig, TeardownRequest};
use pagetear::storage::{MemoryJobStore, StoredObject};

/// Run one page teardown locally: capture desktop/mobile evidence, compose
/// the report and write the paginated PDF plus the raw captures to disk.
/// Findings are left empty unless a critique backend is wired in.
#[derive(Parser, Debug)]
#[command(name = "pagetear", version, about)]
struct Args {
    /// Target page URL (scheme optional, https assumed)
    url: String,

    /// Free-text goal or notes woven into the report header
    #[arg(long)]
    notes: Option<String>,

    /// Output directory for artifacts
    #[arg(long, default_value = "teardown-out")]
    out: PathBuf,

    /// Skip the third, menu-open mobile capture
    #[arg(long)]
    skip_menu: bool,

    /// Path to a Chrome/Chromium executable (auto-detected when omitted)
    #[arg(long)]
    chrome: Option<String>,
}

/// Prefix bare hosts with https; everything else passes through untouched.
fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut cfg = PipelineConfig::standard();
    cfg.capture_menu = !args.skip_menu;
    cfg.session.chrome_path = args.chrome.clone();

    let store = pagetear::storage::FsStore::new(&args.out);
    let jobs = MemoryJobStore::new();
    let request = TeardownRequest {
        url: normalize_url(&args.url),
        notes: args.notes.clone(),
    };

    let output = run_teardown(&request, &NullCritique, &store, &jobs, &cfg)
        .await
        .with_context(|| format!("teardown of {} failed", request.url))?;

    println!("job {} done", output.job_id);
    print_artifact("pdf", &output.artifacts.pdf);
    print_artifact("desktop", &output.artifacts.desktop);
    print_artifact("mobile", &output.artifacts.mobile);
    if let Some(ref menu) = output.artifacts.mobile_menu {
        print_artifact("mobile-menu", menu);
    }
    Ok(())
}

fn print_artifact(label: &str, artifact: &StoredObject) {
    match artifact {
        StoredObject::Url { url } => println!("  {}: {}", label, url),
        StoredObject::Bytes { data } => println!("  {}: {} bytes (in memory)", label, data.len()),
    }
}
