use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use sheet_indexer::config::Config;
use sheet_indexer::indexer::batch::run_batch;
use sheet_indexer::indexer::batch::BatchJob;
use sheet_indexer::indexer::batch::CancellationToken;
use sheet_indexer::indexer::pipeline::ProcessOptions;
use sheet_indexer::indexer::pipeline::ProcessReport;
use sheet_indexer::indexer::pipeline::Tool;
use sheet_indexer::indexer::progress::LogProgress;
use sheet_indexer::indexer::provider::provider_by_name;
use sheet_indexer::indexer::provider::provider_from_env;
use sheet_indexer::indexer::provider::ExcelToolsProvider;
use sheet_indexer::indexer::provider::PROVIDER_ENV;
use sheet_indexer::indexer::ColumnRef;
use sheet_indexer::indexer::UnresolvedPolicy;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ToolName {
    Sections,
    Matching,
}

/// Annotates construction budget workbooks with section names and codebook
/// descriptions.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log every marker and code match
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the worksheets of a workbook
    Analyze { input: PathBuf },

    /// Insert a column and fill it with the section of every row
    FillSections {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Column holding the section marker
        #[arg(long)]
        marker: Option<ColumnRef>,
        /// Column holding the section name
        #[arg(long)]
        label: Option<ColumnRef>,
        /// Column receiving the section names
        #[arg(long)]
        target: Option<ColumnRef>,
        /// Marker value
        #[arg(long)]
        sentinel: Option<String>,
        /// Header written above the section names
        #[arg(long)]
        header_label: Option<String>,
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Fill descriptions from a codebook workbook by code prefix
    MatchCodes {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Codebook workbook
        #[arg(long)]
        codebook: PathBuf,
        /// Codebook sheet, the first sheet by default
        #[arg(long)]
        codebook_sheet: Option<String>,
        /// Column holding the codes
        #[arg(long)]
        code: Option<ColumnRef>,
        /// Column receiving the descriptions
        #[arg(long)]
        target: Option<ColumnRef>,
        /// `blank`, `reset` or `marker:TEXT`
        #[arg(long, value_parser = parse_unresolved)]
        unresolved: Option<UnresolvedPolicy>,
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Process many workbooks in parallel
    Batch {
        #[arg(long, value_enum)]
        tool: ToolName,
        /// Directory receiving the processed workbooks
        #[arg(long)]
        output_dir: PathBuf,
        /// Codebook workbook, required by the matching tool
        #[arg(long)]
        codebook: Option<PathBuf>,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Sheet name or glob pattern (repeatable), the first sheet by default
    #[arg(long = "sheet")]
    sheets: Vec<String>,
    /// Row holding the headers, 0 for none
    #[arg(long)]
    header_row: Option<u32>,
    /// Insert a column at this position before the pass
    #[arg(long, conflicts_with = "no_insert")]
    insert_at: Option<u32>,
    /// Do not insert a column
    #[arg(long)]
    no_insert: bool,
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

impl CommonArgs {
    fn apply(&self, options: &mut ProcessOptions) {
        if !self.sheets.is_empty() {
            options.sheets_to_include = self.sheets.clone();
        }
        if self.no_insert {
            options.insert_column = None;
        } else if let Some(at) = self.insert_at {
            options.insert_column = Some(at);
        }
        if let Some(header_row) = self.header_row {
            match &mut options.tool {
                Tool::Sections(config) => config.header_row = header_row,
                Tool::Matching { config, .. } => config.header_row = header_row,
            }
        }
    }
}

fn parse_unresolved(value: &str) -> Result<UnresolvedPolicy, String> {
    match value {
        "blank" => Ok(UnresolvedPolicy::LeaveBlank),
        "reset" => Ok(UnresolvedPolicy::ResetPropagation),
        _ => match value.strip_prefix("marker:") {
            Some(marker) => Ok(UnresolvedPolicy::Marker(marker.to_owned())),
            None => Err(format!("expected blank, reset or marker:TEXT, got '{value}'")),
        },
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read config '{}'", path.display()))?;
    Config::from_toml(&text).with_context(|| format!("Invalid config '{}'", path.display()))
}

fn provider(config: &Config) -> Result<Box<dyn ExcelToolsProvider>> {
    let provider = match (&config.provider, std::env::var_os(PROVIDER_ENV)) {
        (Some(name), None) => provider_by_name(name)?,
        _ => provider_from_env()?,
    };
    if !provider.check_health() {
        bail!("Provider is not available");
    }
    Ok(provider)
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))
}

fn print_report(report: &ProcessReport, format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        ReportFormat::Text => {
            for sheet in &report.sheets {
                println!(
                    "{}: {} rows, {} sections, {} codes, {} matched, {} filled",
                    sheet.sheet, sheet.rows_scanned, sheet.sections_found, sheet.codes_found, sheet.codes_matched, sheet.rows_filled
                );
            }
            for diagnostic in report.diagnostics() {
                println!("  row {}: {:?}", diagnostic.row, diagnostic.kind);
            }
        }
    }
    Ok(())
}

fn process(provider: &dyn ExcelToolsProvider, input: &Path, output: &Path, options: &ProcessOptions, format: ReportFormat) -> Result<()> {
    let bytes = read(input)?;
    let result = provider
        .process(&bytes, options)
        .with_context(|| format!("Failed to process '{}'", input.display()))?;
    fs::write(output, &result.bytes).with_context(|| format!("Failed to write '{}'", output.display()))?;
    print_report(&result.report, format)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let provider = provider(&config)?;

    match cli.command {
        Command::Analyze { input } => {
            for name in provider.analyze(&read(&input)?)? {
                println!("{name}");
            }
        }
        Command::FillSections { input, output, marker, label, target, sentinel, header_label, common } => {
            let mut options = config.section_options();
            if let Tool::Sections(pass) = &mut options.tool {
                pass.marker_column = marker.unwrap_or(pass.marker_column.clone());
                pass.label_column = label.unwrap_or(pass.label_column.clone());
                pass.target_column = target.unwrap_or(pass.target_column.clone());
                pass.sentinel = sentinel.unwrap_or(pass.sentinel.clone());
                pass.header_label = header_label.unwrap_or(pass.header_label.clone());
            }
            common.apply(&mut options);
            options.progress = Arc::new(LogProgress);
            process(provider.as_ref(), &input, &output, &options, common.report)?;
        }
        Command::MatchCodes { input, output, codebook, codebook_sheet, code, target, unresolved, common } => {
            let mut config = config;
            if codebook_sheet.is_some() {
                config.matching.codebook.sheet = codebook_sheet;
            }
            let mut options = config.matching_options(read(&codebook)?);
            if let Tool::Matching { config: pass, .. } = &mut options.tool {
                pass.code_column = code.unwrap_or(pass.code_column.clone());
                pass.target_column = target.unwrap_or(pass.target_column.clone());
                pass.unresolved = unresolved.unwrap_or(pass.unresolved.clone());
            }
            common.apply(&mut options);
            options.progress = Arc::new(LogProgress);
            process(provider.as_ref(), &input, &output, &options, common.report)?;
        }
        Command::Batch { tool, output_dir, codebook, inputs, common } => {
            let mut options = match (tool, codebook) {
                (ToolName::Sections, _) => config.section_options(),
                (ToolName::Matching, Some(codebook)) => config.matching_options(read(&codebook)?),
                (ToolName::Matching, None) => bail!("The matching tool needs --codebook"),
            };
            common.apply(&mut options);
            fs::create_dir_all(&output_dir).with_context(|| format!("Failed to create '{}'", output_dir.display()))?;
            let jobs = inputs
                .into_iter()
                .map(|input| {
                    let name = input.file_name().map(|name| name.to_owned()).unwrap_or_default();
                    BatchJob { output: output_dir.join(name), input }
                })
                .collect::<Vec<_>>();

            let cancel = CancellationToken::new();
            let outcomes = run_batch(&jobs, provider.as_ref(), &options, &cancel)?;
            let mut failed = 0;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(report) => {
                        println!("{} -> {}", outcome.job.input.display(), outcome.job.output.display());
                        print_report(report, common.report)?;
                    }
                    Err(error) if error.is_structural() => {
                        failed += 1;
                        eprintln!("{}: {}", outcome.job.input.display(), error);
                    }
                    Err(error) => eprintln!("{}: skipped, {}", outcome.job.input.display(), error),
                }
            }
            if failed > 0 {
                bail!("{failed} of {} workbooks failed", outcomes.len());
            }
        }
    }
    Ok(())
}
