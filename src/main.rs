use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use log::LevelFilter;

use restore_exif_core::{
    CancellationToken, NotifierConfig, ProcessControl, RefreshNotifier, RunOptions, TimezoneChoice,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TzPolicy {
    /// +01:00 in winter, +02:00 in summer
    CentralEuropean,
    /// Write no offset tags
    #[value(name = "none")]
    Off,
}

impl From<TzPolicy> for TimezoneChoice {
    fn from(p: TzPolicy) -> Self {
        match p {
            TzPolicy::CentralEuropean => TimezoneChoice::CentralEuropean,
            TzPolicy::Off => TimezoneChoice::None,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "restore-exif",
    version,
    about = "Restore capture dates in photo and video metadata from their filenames"
)]
struct Cli {
    /// Directory holding the media files
    path: PathBuf,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Overwrite dates that are already present
    #[arg(short, long)]
    force: bool,

    /// Change nothing; list the files that would be modified
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Where dry-run lists the files it would modify
    #[arg(long, default_value = "dry_run.log")]
    dry_run_log: PathBuf,

    /// Worker threads (default: available cores, at most 8)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Also set filesystem times to the capture date
    #[arg(short = 'm', long = "mod")]
    set_file_times: bool,

    /// UTC offset written next to photo dates
    #[arg(long, value_enum, default_value = "central-european")]
    tz_policy: TzPolicy,

    /// Ask the server to refresh only when more files than this were modified
    #[arg(long)]
    min_refresh_batch: Option<usize>,

    /// Seconds to wait before notifying the server
    #[arg(long)]
    settle_secs: Option<u64>,

    /// Never contact the server
    #[arg(long)]
    no_refresh: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_secs()
        .init();
}

fn notifier(cli: &Cli) -> anyhow::Result<Option<RefreshNotifier>> {
    if cli.no_refresh {
        return Ok(None);
    }
    let mut config = NotifierConfig::from_env();
    if let Some(n) = cli.min_refresh_batch {
        config.min_batch = n;
    }
    if let Some(secs) = cli.settle_secs {
        config.settle = Duration::from_secs(secs);
    }
    let notifier = RefreshNotifier::from_config(&config)?;
    if notifier.is_none() {
        log::info!("IMMICH_URL not set, server refresh disabled");
    }
    Ok(notifier)
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let t_total = std::time::Instant::now();

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        log::warn!("Interrupt received, finishing files in progress");
        handler_token.cancel();
    })?;

    let options = RunOptions {
        root: cli.path.clone(),
        recursive: cli.recursive,
        force: cli.force,
        dry_run: cli.dry_run,
        dry_run_log: cli.dry_run_log.clone(),
        workers: cli.workers,
        set_file_times: cli.set_file_times,
        timezone: cli.tz_policy.into(),
    };
    let notifier = notifier(&cli)?;
    let control = ProcessControl::new().with_cancel_token(token);

    let report = restore_exif_core::process(&options, notifier.as_ref(), &control, &|done, total| {
        log::info!("Processed {}/{} files", done, total);
    })?;

    if report.cancelled {
        log::warn!("Run was cancelled, the summary covers completed files only");
    }
    println!("Summary ({} files found):", report.discovered);
    for (outcome, count) in report.tally.iter() {
        println!("  {}: {}", outcome, count);
    }
    if let Some(refresh) = &report.refresh {
        println!(
            "  refresh: {} queued, {} without credential, {} not found, {} failed",
            refresh.refreshed, refresh.missing_credential, refresh.not_found, refresh.failed
        );
    }
    if options.dry_run {
        println!("  dry-run log: {}", options.dry_run_log.display());
    }
    log::info!("Total: {:.2}s", t_total.elapsed().as_secs_f64());
    Ok(())
}
