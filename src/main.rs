//! CLI entry point for the tweet mobility tool.
//!
//! Provides subcommands for retrieving posts from the full-archive search,
//! cleaning retrieved posts, listing rolling windows and computing the
//! per-window mobility metrics.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use tweet_mobility::analyzers::aggregate::{ResumePoint, Stage, run_plan};
use tweet_mobility::config::{RunConfig, WindowSource};
use tweet_mobility::filters::analysis::exceptional_days;
use tweet_mobility::filters::{FilterOptions, RecordPipeline};
use tweet_mobility::geometry::{LandUse, Zones};
use tweet_mobility::infra::twitter::TwitterClient;
use tweet_mobility::output::{
    load_json, load_records_raw, save_json, save_records_raw, write_records_csv,
    write_records_wkt,
};
use tweet_mobility::places::extract_places;
use tweet_mobility::query::SearchParams;
use tweet_mobility::services::archive::{Backup, Paginator};
use tweet_mobility::subsets::Dataset;
use tweet_mobility::windows::{
    WindowPlan, format_key, load_manual_windows, make_windows, parse_key, preset,
};

#[derive(Parser)]
#[command(name = "tweet_mobility")]
#[command(about = "Retrieve, clean and analyse geotagged posts over rolling windows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve posts from the full-archive search
    Fetch {
        /// JSON file with the search parameters
        #[arg(value_name = "PARAMS")]
        params: PathBuf,

        /// Maximum number of result pages to request
        #[arg(short, long, default_value_t = 1)]
        pages: usize,

        /// Where to write the retrieved records (gzip when ending in .gz)
        #[arg(short, long, default_value = "data/tweets/raw.json.gz")]
        output: PathBuf,

        /// Optional: write a backup every this many pages
        #[arg(long)]
        backup_every: Option<usize>,
    },
    /// Remove bots, duplicates and unwanted geo annotations from retrieved posts
    Clean {
        /// Records written by `fetch`
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// CSV file for the cleaned records
        #[arg(short, long, default_value = "data/tweets/cleaned.csv")]
        output: PathBuf,

        /// Optional: JSON file with the filter switches
        #[arg(long)]
        filters: Option<PathBuf>,

        /// Skip the bot and duplicate filters
        #[arg(long, default_value_t = false)]
        keep_bots: bool,

        /// Optional: also save the cleaned records as JSON
        #[arg(long)]
        records: Option<PathBuf>,

        /// Optional: write record locations as WKT points
        #[arg(long)]
        wkt: Option<PathBuf>,

        /// Optional: write the extracted places as JSON
        #[arg(long)]
        places: Option<PathBuf>,
    },
    /// List the windows a run would process
    ListWindows {
        /// Window size in days
        #[arg(short, long, default_value_t = 5)]
        size: u32,

        /// First day of the study period (YYYYMMDD)
        #[arg(long, default_value = "20200406")]
        start: String,

        /// Day after the study period (YYYYMMDD)
        #[arg(long, default_value = "20200701")]
        end: String,

        /// Tile the period instead of starting a window every day
        #[arg(long, default_value_t = false)]
        no_overlap: bool,

        /// Use a built-in window set instead (on_offset, total)
        #[arg(long)]
        preset: Option<String>,

        /// Use a start,end,label CSV instead
        #[arg(long, conflicts_with = "preset")]
        table: Option<PathBuf>,
    },
    /// Compute the metrics table of one or more window plans
    Run {
        /// Optional: JSON run configuration; defaults are used otherwise
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Window sizes in days, replacing the configured ones
        #[arg(short = 'w', long = "window-size", num_args = 1..)]
        window_sizes: Vec<u32>,

        /// Use a built-in window set (on_offset, total)
        #[arg(long)]
        preset: Option<String>,

        /// Use a start,end,label CSV
        #[arg(long, conflicts_with = "preset")]
        table: Option<PathBuf>,

        /// Down-sample every window to this many rows
        #[arg(long)]
        sample: Option<usize>,

        /// Seed for the down-sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Allow windows spanning an even number of days
        #[arg(long, default_value_t = false)]
        allow_even: bool,

        /// Resume at this stage (basic, od_matrix, mobility, flows, land_use)
        #[arg(long, value_parser = parse_stage)]
        resume_stage: Option<Stage>,

        /// Window index to resume the stage at
        #[arg(long, default_value_t = 0, requires = "resume_stage")]
        resume_index: usize,
    },
}

fn parse_stage(s: &str) -> std::result::Result<Stage, String> {
    Stage::ALL
        .into_iter()
        .find(|stage| stage.as_str() == s)
        .ok_or_else(|| format!("unknown stage {s:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/tweet_mobility.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("tweet_mobility.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            params,
            pages,
            output,
            backup_every,
        } => {
            fetch(&params, pages, &output, backup_every).await?;
        }
        Commands::Clean {
            input,
            output,
            filters,
            keep_bots,
            records,
            wkt,
            places,
        } => {
            let options = match filters {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    serde_json::from_str(&text)?
                }
                None => FilterOptions::default(),
            };
            clean(&input, &output, options, keep_bots, records, wkt, places)?;
        }
        Commands::ListWindows {
            size,
            start,
            end,
            no_overlap,
            preset: preset_name,
            table,
        } => {
            let plan = match (preset_name, table) {
                (Some(name), _) => {
                    preset(&name).with_context(|| format!("unknown window preset {name:?}"))?
                }
                (None, Some(path)) => load_manual_windows(&path)?,
                (None, None) => make_windows(size, parse_key(&start)?, parse_key(&end)?, !no_overlap)?,
            };
            list_windows(&plan);
        }
        Commands::Run {
            config,
            window_sizes,
            preset: preset_name,
            table,
            sample,
            seed,
            allow_even,
            resume_stage,
            resume_index,
        } => {
            let mut config = match config {
                Some(path) => RunConfig::load(&path)?,
                None => RunConfig::default(),
            };
            if !window_sizes.is_empty() {
                config.window_sizes = window_sizes;
            }
            if let Some(name) = preset_name {
                config.windows = Some(WindowSource::Preset(name));
            }
            if let Some(path) = table {
                config.windows = Some(WindowSource::Table(path));
            }
            if sample.is_some() {
                config.sample_size = sample;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            config.allow_even |= allow_even;
            if let Some(stage) = resume_stage {
                config.resume = Some(ResumePoint {
                    stage,
                    index: resume_index,
                });
            }
            run(&config)?;
        }
    }

    Ok(())
}

/// Pages through the search results and saves every record retrieved.
#[tracing::instrument(skip(params_path, output))]
async fn fetch(
    params_path: &Path,
    pages: usize,
    output: &Path,
    backup_every: Option<usize>,
) -> Result<()> {
    let params: SearchParams = load_json(params_path)
        .with_context(|| format!("reading search parameters {}", params_path.display()))?;
    let token = std::env::var("BEARER_TOKEN").context("BEARER_TOKEN must be set")?;
    let client = TwitterClient::new(&token)?;

    let mut paginator = Paginator::new(client, &params)?;
    if let Some(every_pages) = backup_every {
        paginator = paginator.with_backup(Backup {
            path: output.with_extension("backup.json.gz"),
            every_pages,
        });
    }

    let records = paginator.fetch(pages).await?;
    if records.is_empty() {
        warn!("Search returned no records");
    }
    let dump = paginator.into_dump();
    save_records_raw(output, &dump.records)?;
    info!(
        records = dump.records.len(),
        next_token = dump.next_token.as_deref().unwrap_or(""),
        output = %output.display(),
        "Records saved"
    );
    Ok(())
}

#[tracing::instrument(skip_all, fields(input = %input.display()))]
fn clean(
    input: &Path,
    output: &Path,
    options: FilterOptions,
    keep_bots: bool,
    records_path: Option<PathBuf>,
    wkt_path: Option<PathBuf>,
    places_path: Option<PathBuf>,
) -> Result<()> {
    let records = load_records_raw(input)?;
    let mut pipeline = RecordPipeline::new(records);

    if !keep_bots {
        pipeline.use_all_bot_filters();
        info!(
            bots = pipeline.bots().len(),
            bot_accounts = pipeline.bot_accounts().len(),
            "Bot filters applied"
        );
    }
    pipeline.use_filters(options);

    let days = exceptional_days(pipeline.records());
    if !days.is_empty() {
        let days: Vec<String> = days.into_iter().map(format_key).collect();
        warn!(days = %days.join(","), "Days with exceptionally many records");
    }

    write_records_csv(output, pipeline.rows())?;
    if let Some(path) = wkt_path {
        let written = write_records_wkt(&path, pipeline.records())?;
        info!(path = %path.display(), written, "Record locations written");
    }
    if let Some(path) = places_path {
        let (_, places) = extract_places(pipeline.records());
        save_json(&path, &places)?;
    }
    if let Some(path) = records_path {
        save_records_raw(&path, pipeline.records())?;
    }

    info!(
        original = pipeline.original().len(),
        kept = pipeline.records().len(),
        output = %output.display(),
        "Cleaning finished"
    );
    Ok(())
}

fn list_windows(plan: &WindowPlan) {
    for (i, window) in plan.windows.iter().enumerate() {
        let middle = window
            .midpoint(true)
            .map(format_key)
            .unwrap_or_default();
        info!(
            index = i,
            start = %format_key(window.start),
            end = %format_key(window.end),
            middle = %middle,
            even = window.span_days() % 2 == 0,
            label = %window.label,
            "Window"
        );
    }
    info!(denom = %plan.denom, windows = plan.len(), "Window plan");
}

/// Validates `config`, loads the inputs once and runs every window plan.
#[tracing::instrument(skip_all)]
fn run(config: &RunConfig) -> Result<()> {
    config.validate()?;
    let plans = config.checked_plans()?;

    let dataset = Dataset::load(&config.dataset)
        .with_context(|| format!("loading dataset {}", config.dataset.display()))?;
    let zones = Zones::load(&config.zones)
        .with_context(|| format!("loading zones {}", config.zones.display()))?;
    let land_use = LandUse::load(&config.land_use)
        .with_context(|| format!("loading land use {}", config.land_use.display()))?;
    if zones.max_code() as usize > config.zone_count {
        warn!(
            max_code = zones.max_code(),
            zone_count = config.zone_count,
            "Zone codes above zone_count are left out of the movement matrices"
        );
    }

    for plan in &plans {
        if plan.is_empty() {
            warn!(denom = %plan.denom, "No windows fit the study period, skipping");
            continue;
        }
        info!(
            denom = %plan.denom,
            windows = plan.len(),
            first = %format_key(plan.windows[0].start),
            "Starting plan"
        );
        let table = run_plan(config, plan, &dataset, &zones, &land_use)?;
        info!(path = %table.path().display(), rows = table.len(), "Plan finished");
    }

    info!("Finished all plans");
    Ok(())
}
