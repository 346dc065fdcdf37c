use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::error;
use webcomic2pdf::batch::{read_url_list, run_batch, BatchEntry, BatchOptions};
use webcomic2pdf::download::DownloadConfig;
use webcomic2pdf::simple::SimpleEngine;
use webcomic2pdf::{Engine, EngineConfig, Extractor, StabilityPolicy};

/// Rendering backend used to load reader pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    /// Headless Chrome over the DevTools Protocol
    Cdp,
    /// Plain HTTP fetch, no JavaScript
    Simple,
}

/// Download webcomic chapters listed in a file and bind each into a PDF
#[derive(Parser, Debug)]
#[command(name = "webcomic2pdf")]
#[command(version, about, long_about = None)]
struct Args {
    /// File with one `URL | Name` entry per line
    #[arg(value_name = "URLS_FILE", default_value = "urls.txt")]
    urls_file: PathBuf,

    /// Directory for the finished PDFs
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Rendering backend
    #[arg(long, value_enum, default_value_t = EngineKind::Cdp)]
    engine: EngineKind,

    /// Pause after each scroll while waiting for lazy images
    #[arg(long, default_value = "400", value_name = "MS")]
    settle_ms: u64,

    /// Polls without growth before the page counts as loaded
    #[arg(long, default_value = "8", value_name = "NUM")]
    stability_threshold: u32,

    /// Give up waiting for the page to settle after this many polls (0 = never)
    #[arg(long, default_value = "750", value_name = "NUM")]
    max_polls: u32,

    /// HTTP and navigation timeout in seconds
    #[arg(long, default_value = "30", value_name = "SECS")]
    timeout: u64,

    /// Log every poll and download
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            headless: !self.headed,
            timeout_ms: self.timeout * 1000,
            stability: StabilityPolicy {
                settle_interval: Duration::from_millis(self.settle_ms),
                threshold: self.stability_threshold,
                max_polls: (self.max_polls > 0).then_some(self.max_polls),
            },
            ..Default::default()
        }
    }

    fn batch_options(&self, config: &EngineConfig) -> BatchOptions {
        BatchOptions {
            output_dir: self.output_dir.clone(),
            download: DownloadConfig {
                timeout_ms: config.timeout_ms,
                user_agent: config.user_agent.clone(),
                referer: None,
            },
            ..Default::default()
        }
    }
}

fn run<E: Engine>(args: &Args, entries: &[BatchEntry]) -> anyhow::Result<usize> {
    let extractor = Extractor::<E>::new(args.engine_config()).context("Failed to start the rendering engine")?;
    let options = args.batch_options(extractor.config());
    let summary = run_batch(&extractor, entries, &options);
    for path in &summary.succeeded {
        println!("{}", path.display());
    }
    Ok(summary.skipped.len())
}

/// Process status for `args`: 0 once the batch ran, 1 when it could not start.
///
/// Entries that fail or find no images are skipped and do not change the status.
fn run_cli(args: &Args) -> u8 {
    if !args.urls_file.exists() {
        error!("{} not found", args.urls_file.display());
        error!("Create it with one entry per line: URL | PDF Name");
        return 1;
    }

    let entries = match read_url_list(&args.urls_file)
        .with_context(|| format!("Failed to read {}", args.urls_file.display()))
    {
        Ok(entries) => entries,
        Err(e) => {
            error!("{:#}", e);
            return 1;
        }
    };
    if entries.is_empty() {
        error!("No URLs found in {}", args.urls_file.display());
        return 1;
    }

    let result = match args.engine {
        #[cfg(feature = "cdp")]
        EngineKind::Cdp => run::<webcomic2pdf::cdp::CdpEngine>(args, &entries),
        #[cfg(not(feature = "cdp"))]
        EngineKind::Cdp => Err(anyhow::anyhow!("built without the `cdp` feature; use --engine simple")),
        EngineKind::Simple => run::<SimpleEngine>(args, &entries),
    };

    match result {
        Ok(_skipped) => 0,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    ExitCode::from(run_cli(&args))
}
