use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kira_metadata_fetcher::combine::combine;
use kira_metadata_fetcher::config::{
    ConfigLoader, EnaOverrides, FetchConfig, FetchOverrides, RunSettings, process_env,
};
use kira_metadata_fetcher::domain::Source;
use kira_metadata_fetcher::edirect::EdirectSource;
use kira_metadata_fetcher::ena::EnaPortalClient;
use kira_metadata_fetcher::error::KiraError;
use kira_metadata_fetcher::merge::{DEFAULT_ENA_DEDUP_KEY, EnaMergeOptions, merge_ena, merge_sra};
use kira_metadata_fetcher::output::{ConsoleOutput, JsonOutput, OutputMode};
use kira_metadata_fetcher::runner::{ProgressSink, QueryRunner, RunReport};
use kira_metadata_fetcher::slim::{DEFAULT_MIN_READS, SlimFilter, SlimSummary, slim_ena, slim_sra};
use kira_metadata_fetcher::source::MetadataSource;
use kira_metadata_fetcher::store::OutputLayout;

#[derive(Parser)]
#[command(name = "kira-mf")]
#[command(about = "Sequential SRA/ENA run-metadata fetcher with merge and slim steps")]
#[command(version, author)]
struct Cli {
    /// Print JSON results on stdout instead of a human summary.
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch SRA RunInfo per query through EDirect")]
    Sra(SraArgs),
    #[command(about = "Fetch ENA read_run metadata per query from the Portal API")]
    Ena(EnaArgs),
    #[command(about = "Merge per-query SRA RunInfo files, one row per Run")]
    MergeSra(MergeSraArgs),
    #[command(about = "Merge per-query ENA read_run files with query ids and dedup index")]
    MergeEna(MergeEnaArgs),
    #[command(about = "Filter a merged SRA RunInfo table to WGS metagenomic runs")]
    SlimSra(SlimArgs),
    #[command(about = "Filter a merged ENA read_run table to WGS metagenomic runs")]
    SlimEna(SlimArgs),
    #[command(about = "Combine slimmed SRA and ENA tables into one schema")]
    Combine(CombineArgs),
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Seconds to sleep after each query (env: SLEEP_SEC).
    #[arg(long)]
    delay: Option<f64>,

    /// Extra attempts after a failed fetch.
    #[arg(long)]
    retries: Option<u32>,

    /// Seconds between fetch attempts.
    #[arg(long)]
    retry_delay: Option<f64>,

    /// JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct SraArgs {
    #[arg(default_value = "queries/sra_queries.tsv")]
    queries: PathBuf,

    #[arg(default_value = "raw_data/sra/per_query")]
    out_dir: PathBuf,

    /// Skip queries with more hits than this (env: MAX_HITS).
    #[arg(long)]
    max_hits: Option<u64>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct EnaArgs {
    #[arg(default_value = "queries/ena_queries.tsv")]
    queries: PathBuf,

    #[arg(default_value = "raw_data/ena/per_query")]
    out_dir: PathBuf,

    /// Comma separated read_run fields.
    #[arg(long, value_delimiter = ',')]
    fields: Option<Vec<String>>,

    /// Maximum results per query, 0 for all.
    #[arg(long)]
    limit: Option<u64>,

    #[arg(long)]
    base_url: Option<String>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct MergeSraArgs {
    #[arg(default_value = "raw_data/sra/per_query")]
    input_dir: PathBuf,

    #[arg(default_value = "raw_data/sra/sra_merged_runs.csv")]
    output: PathBuf,
}

#[derive(Args)]
struct MergeEnaArgs {
    #[arg(default_value = "raw_data/ena/per_query")]
    input_dir: PathBuf,

    #[arg(default_value = "raw_data/ena/merged")]
    out_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_ENA_DEDUP_KEY)]
    dedup_key: String,

    /// Write every row instead of one per dedup key.
    #[arg(long)]
    keep_all: bool,
}

#[derive(Args)]
struct SlimArgs {
    /// Input table, optionally gzip compressed.
    input: PathBuf,

    /// Output table; a `.gz` name is gzip compressed.
    output: PathBuf,

    #[arg(long, default_value_t = DEFAULT_MIN_READS)]
    min_reads: u64,

    #[arg(long, default_value = "WGS")]
    library_strategy: String,

    #[arg(long, default_value = "RANDOM")]
    library_selection: String,

    #[arg(long, default_value = "METAGENOMIC")]
    library_source: String,

    #[arg(long, default_value = "Homo sapiens")]
    scientific_name: String,
}

impl SlimArgs {
    fn filter(&self) -> SlimFilter {
        SlimFilter {
            min_reads: self.min_reads,
            library_strategy: self.library_strategy.clone(),
            library_selection: self.library_selection.clone(),
            library_source: self.library_source.clone(),
            scientific_name: self.scientific_name.clone(),
        }
    }
}

#[derive(Args)]
struct CombineArgs {
    ena: PathBuf,
    sra: PathBuf,
    output: PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::MissingInput(_) | KiraError::NoInputFiles(_) => 2,
        KiraError::MissingTool(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Sra(args) => run_sra(args, output_mode),
        Commands::Ena(args) => run_ena(args, output_mode),
        Commands::MergeSra(args) => {
            let summary = merge_sra(&args.input_dir, &args.output)?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_sra_merge(&summary).into_diagnostic(),
                OutputMode::Interactive => {
                    ConsoleOutput::print_sra_merge(&summary);
                    Ok(())
                }
            }
        }
        Commands::MergeEna(args) => {
            let options = EnaMergeOptions {
                dedup_key: args.dedup_key,
                keep_all: args.keep_all,
            };
            let summary = merge_ena(&args.input_dir, &args.out_dir, &options)?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_ena_merge(&summary).into_diagnostic(),
                OutputMode::Interactive => {
                    ConsoleOutput::print_ena_merge(&summary);
                    Ok(())
                }
            }
        }
        Commands::SlimSra(args) => {
            let summary = slim_sra(&args.input, &args.output, &args.filter())?;
            print_slim(&summary, output_mode)
        }
        Commands::SlimEna(args) => {
            let summary = slim_ena(&args.input, &args.output, &args.filter())?;
            print_slim(&summary, output_mode)
        }
        Commands::Combine(args) => {
            let summary = combine(&args.ena, &args.sra, &args.output)?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_combine(&summary).into_diagnostic(),
                OutputMode::Interactive => {
                    ConsoleOutput::print_combine(&summary);
                    Ok(())
                }
            }
        }
    }
}

fn run_settings(
    source: Source,
    run: &RunArgs,
    max_hits: Option<u64>,
) -> miette::Result<(FetchConfig, RunSettings)> {
    let config = ConfigLoader::load(run.config.as_deref())?;
    let overrides = FetchOverrides {
        delay_secs: run.delay,
        max_hits,
        retries: run.retries,
        retry_delay_secs: run.retry_delay,
    };
    let settings = ConfigLoader::resolve_run(source, &config, &overrides, process_env)?;
    Ok((config, settings))
}

fn run_sra(args: SraArgs, output_mode: OutputMode) -> miette::Result<()> {
    let (_, settings) = run_settings(Source::Sra, &args.run, args.max_hits)?;
    let edirect = EdirectSource::discover()?;
    let tools = edirect.tool_info();
    info!(
        esearch = %tools.esearch,
        efetch = %tools.efetch,
        xtract = %tools.xtract,
        api_key = tools.api_key,
        "using EDirect"
    );
    execute(edirect, &args.queries, &args.out_dir, settings, output_mode)
}

fn run_ena(args: EnaArgs, output_mode: OutputMode) -> miette::Result<()> {
    let (config, settings) = run_settings(Source::Ena, &args.run, None)?;
    let ena_settings = ConfigLoader::resolve_ena(
        &config.ena,
        &EnaOverrides {
            fields: args.fields,
            limit: args.limit,
            base_url: args.base_url,
        },
    );
    let client = EnaPortalClient::new(ena_settings)?;
    execute(client, &args.queries, &args.out_dir, settings, output_mode)
}

fn execute<S: MetadataSource>(
    source: S,
    queries: &Path,
    out_dir: &Path,
    settings: RunSettings,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let layout = OutputLayout::from_path(out_dir)?;
    let runner = QueryRunner::new(source, layout, settings);
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Interactive => &ConsoleOutput,
        OutputMode::NonInteractive => &JsonOutput,
    };
    let report = runner.run(queries, sink)?;
    print_run(&report, output_mode)
}

fn print_run(report: &RunReport, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_run(report).into_diagnostic(),
        OutputMode::Interactive => {
            ConsoleOutput::print_run(report);
            Ok(())
        }
    }
}

fn print_slim(
    summary: &SlimSummary,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_slim(summary).into_diagnostic(),
        OutputMode::Interactive => {
            ConsoleOutput::print_slim(summary);
            Ok(())
        }
    }
}
