//! CLI binary for cst-studybot.
//!
//! A thin shim over the library crate: maps flags and the settings file to
//! `StudyBotConfig`, constructs the store, model client and statistics table
//! once, and renders results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cst_studybot::scrape::{self, DownloadStatus};
use cst_studybot::{
    create_embedder, ingest_papers, run_analysis, ExamStore, IngestProgressCallback,
    IngestSummary, LlmExtractionClient, PageOutcome, PdfiumRasterizer, ProgressCallback,
    SearchOutcome, SearchService, Settings, StatsLookup, StatsTable, StudyBotConfig, Topic,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar for ingestion. Pages finish out of order, so every line
/// names its record identifier.
///
/// The bar is created on `on_ingest_start`, so a run that fails during
/// startup never leaves a spinner behind.
struct CliIngestProgress {
    bar: OnceLock<ProgressBar>,
}

impl CliIngestProgress {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: OnceLock::new(),
        })
    }
}

impl IngestProgressCallback for CliIngestProgress {
    fn on_ingest_start(&self, papers: usize, pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        let bar = self.bar.get_or_init(|| ProgressBar::new(pages as u64));
        bar.set_style(style);
        bar.set_prefix("Ingesting");
        bar.enable_steady_tick(Duration::from_millis(80));
        bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{pages} pages from {papers} papers…"))
        ));
    }

    fn on_page_complete(&self, id: &str, outcome: &PageOutcome) {
        let Some(bar) = self.bar.get() else {
            return;
        };
        let line = match outcome {
            PageOutcome::Processed => format!("  {} {id}", green("✓")),
            PageOutcome::Skipped => format!("  {} {id}  {}", dim("↷"), dim("already stored")),
            PageOutcome::RateLimited => {
                format!("  {} {id}  {}", yellow("⏸"), yellow("rate limited, deferred"))
            }
            PageOutcome::Failed(e) => {
                let msg = e.to_string();
                let msg = if msg.chars().count() > 80 {
                    format!("{}\u{2026}", msg.chars().take(79).collect::<String>())
                } else {
                    msg
                };
                format!("  {} {}", red("✗"), red(&msg))
            }
        };
        bar.println(line);
        bar.inc(1);
    }

    fn on_ingest_complete(&self, _summary: &IngestSummary) {
        if let Some(bar) = self.bar.get() {
            bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Fetch Part IA papers 2018-2024 into exam_papers/
  studybot scrape --from 2018 --to 2024

  # Extract every page into the vector store (resumable)
  studybot ingest

  # Build metadata_YYYY.json from reports/Report_YYYY.pdf
  studybot analyze

  # One-shot search, or an interactive session without a query
  studybot search "Karnaugh maps" --topic digital-electronics
  studybot search

  # What is in the store?
  studybot inspect

SETTINGS FILE (studybot.toml, all keys optional):
  provider = "gemini"
  model = "gemini-2.5-flash"
  db_path = "./cst_db/store.sqlite"
  papers_dir = "exam_papers"
  reports_dir = "reports"
  stats_dir = "."
  pdfium_lib_path = "/opt/pdfium/lib"
  concurrency = 4
  dpi = 100

  Precedence: built-in defaults < settings file < environment < flags.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter, e.g. cst_studybot=debug
"#;

/// Cambridge Part IA exam archive study aid.
#[derive(Parser, Debug)]
#[command(
    name = "studybot",
    version,
    about = "Search Cambridge CST Part IA exam questions with examiner statistics",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Settings file; a missing file is ignored.
    #[arg(long, global = true, env = "STUDYBOT_SETTINGS", default_value = "studybot.toml")]
    settings: PathBuf,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, global = true, env = "STUDYBOT_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID.
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Vector store file.
    #[arg(long, global = true, env = "STUDYBOT_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Directory holding metadata_YYYY.json files.
    #[arg(long, global = true, env = "STUDYBOT_STATS_DIR")]
    stats_dir: Option<PathBuf>,

    /// Directory containing the pdfium shared library.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "STUDYBOT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "STUDYBOT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download exam papers from the Computer Laboratory archive.
    Scrape(ScrapeArgs),
    /// Extract exam pages into the vector store.
    Ingest(IngestArgs),
    /// Turn examiners' reports into per-question statistics.
    Analyze(AnalyzeArgs),
    /// Find a question, with a hint and examiner statistics.
    Search(SearchArgs),
    /// Show what the store and statistics contain.
    Inspect,
}

#[derive(Args, Debug)]
struct ScrapeArgs {
    /// First year to fetch.
    #[arg(long, default_value_t = 2018)]
    from: u16,

    /// Last year to fetch (inclusive).
    #[arg(long, default_value_t = 2024)]
    to: u16,

    /// Destination for papers.
    #[arg(long, env = "STUDYBOT_PAPERS_DIR")]
    papers_dir: Option<PathBuf>,

    /// Reports directory to create for manually downloaded reports.
    #[arg(long, env = "STUDYBOT_REPORTS_DIR")]
    reports_dir: Option<PathBuf>,

    /// Archive base URL.
    #[arg(long, default_value = scrape::BASE_URL)]
    base_url: String,

    /// HTTP timeout in seconds.
    #[arg(long, default_value_t = 120)]
    timeout: u64,
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Directory of yYYYYPAPERN.pdf files.
    #[arg(long, env = "STUDYBOT_PAPERS_DIR")]
    papers_dir: Option<PathBuf>,

    /// Concurrent pages.
    #[arg(short, long, env = "STUDYBOT_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Leading cover pages to skip in every paper.
    #[arg(long, default_value_t = 2)]
    cover_pages: usize,

    /// Rendering DPI (72–400).
    #[arg(long, env = "STUDYBOT_DPI",
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: Option<u32>,

    /// Seconds to back off after a rate-limit response.
    #[arg(long, default_value_t = 10)]
    backoff: u64,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Directory of Report_YYYY.pdf files.
    #[arg(long, env = "STUDYBOT_REPORTS_DIR")]
    reports_dir: Option<PathBuf>,

    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Search query; omit for an interactive session.
    query: Option<String>,

    /// Topic filter, e.g. algorithms, discrete-mathematics.
    #[arg(long, short, default_value = "all")]
    topic: Topic,

    /// Also list the retrieved candidates.
    #[arg(long)]
    show_candidates: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while a progress bar is active; the
    // bar provides the feedback that matters.
    let bar_active = matches!(
        &cli.command,
        Command::Ingest(a) if !a.no_progress && !a.json
    ) && !cli.global.quiet;
    let filter = if cli.global.verbose {
        "debug"
    } else if cli.global.quiet || bar_active {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let settings = Settings::load(&cli.global.settings)
        .with_context(|| format!("Failed to load {}", cli.global.settings.display()))?;

    match &cli.command {
        Command::Scrape(args) => run_scrape(&cli.global, &settings, args).await,
        Command::Ingest(args) => run_ingest(&cli.global, &settings, args).await,
        Command::Analyze(args) => run_analyze(&cli.global, &settings, args).await,
        Command::Search(args) => run_search(&cli.global, &settings, args).await,
        Command::Inspect => run_inspect(&cli.global, &settings).await,
    }
}

/// Layer settings file, then environment/flags, over the defaults.
fn base_config(global: &GlobalArgs, settings: &Settings) -> cst_studybot::StudyBotConfigBuilder {
    let mut builder = StudyBotConfig::builder().settings(settings);
    if let Some(ref p) = global.provider {
        builder = builder.provider_name(p.clone());
    }
    if let Some(ref m) = global.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref p) = global.db_path {
        builder = builder.db_path(p.clone());
    }
    if let Some(ref d) = global.stats_dir {
        builder = builder.stats_dir(d.clone());
    }
    if let Some(ref d) = global.pdfium_lib_path {
        builder = builder.pdfium_lib_path(d.clone());
    }
    builder
}

fn rasterizer_for(config: &StudyBotConfig) -> Result<PdfiumRasterizer> {
    let rasterizer = PdfiumRasterizer::new(config.dpi, config.pdfium_lib_path.clone());
    rasterizer.probe().context("PDF engine unavailable")?;
    Ok(rasterizer)
}

// ── scrape ───────────────────────────────────────────────────────────────

async fn run_scrape(global: &GlobalArgs, settings: &Settings, args: &ScrapeArgs) -> Result<()> {
    let mut builder = base_config(global, settings);
    if let Some(ref d) = args.papers_dir {
        builder = builder.papers_dir(d.clone());
    }
    if let Some(ref d) = args.reports_dir {
        builder = builder.reports_dir(d.clone());
    }
    let config = builder.build().context("Invalid configuration")?;

    scrape::setup_directories(&config.papers_dir, &config.reports_dir)
        .context("Failed to create directories")?;
    let links = scrape::paper_urls(&args.base_url, args.from, args.to);
    if !global.quiet {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Fetching {} papers ({}–{})…", links.len(), args.from, args.to))
        );
    }

    let summary = scrape::download_papers(
        &links,
        &config.papers_dir,
        scrape::REQUEST_DELAY,
        args.timeout,
    )
    .await
    .context("Download failed")?;

    if !global.quiet {
        for (name, status) in &summary.results {
            match status {
                DownloadStatus::Downloaded => eprintln!("  {} {name}", green("✓")),
                DownloadStatus::AlreadyPresent => {
                    eprintln!("  {} {name}  {}", dim("↷"), dim("already exists"))
                }
                DownloadStatus::Failed(reason) => eprintln!("  {} {}", red("✗"), red(reason)),
            }
        }
        eprintln!(
            "\n{} Place the examiners' reports as Report_YYYY.pdf in '{}'.",
            yellow("Action required:"),
            config.reports_dir.display()
        );
    }
    Ok(())
}

// ── ingest ───────────────────────────────────────────────────────────────

async fn run_ingest(global: &GlobalArgs, settings: &Settings, args: &IngestArgs) -> Result<()> {
    let mut builder = base_config(global, settings)
        .cover_pages(args.cover_pages)
        .rate_limit_backoff_secs(args.backoff);
    if let Some(ref d) = args.papers_dir {
        builder = builder.papers_dir(d.clone());
    }
    if let Some(n) = args.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(dpi) = args.dpi {
        builder = builder.dpi(dpi);
    }
    let mut config = builder.build().context("Invalid configuration")?;

    let rasterizer = rasterizer_for(&config)?;
    let client = LlmExtractionClient::from_config(&config).context("Model provider")?;
    let embedder = create_embedder().await.context("Embedding model")?;
    let store = ExamStore::open(&config.db_path, &config.collection, embedder)
        .await
        .context("Failed to open vector store")?;

    if !global.quiet && !args.no_progress && !args.json {
        let cb: ProgressCallback = CliIngestProgress::new();
        config.progress_callback = Some(cb);
    }

    let summary = ingest_papers(&config, &rasterizer, &client, &store)
        .await
        .context("Ingestion failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !global.quiet {
        let mark = if summary.failed == 0 && summary.rate_limited == 0 {
            green("✔")
        } else {
            cyan("⚠")
        };
        eprintln!(
            "{mark}  {} processed  {} skipped  {} rate-limited  {} failed  \
             ({} cover pages, {} unreadable files)  {}ms",
            bold(&summary.processed.to_string()),
            summary.skipped,
            summary.rate_limited,
            summary.failed,
            summary.cover_pages_skipped,
            summary.unreadable_files,
            summary.duration_ms,
        );
        if summary.rate_limited > 0 {
            eprintln!("   {}", dim("Rerun to pick up rate-limited pages."));
        }
    }
    Ok(())
}

// ── analyze ──────────────────────────────────────────────────────────────

async fn run_analyze(global: &GlobalArgs, settings: &Settings, args: &AnalyzeArgs) -> Result<()> {
    let mut builder = base_config(global, settings);
    if let Some(ref d) = args.reports_dir {
        builder = builder.reports_dir(d.clone());
    }
    let config = builder.build().context("Invalid configuration")?;

    let text_source = rasterizer_for(&config)?;
    let client = LlmExtractionClient::from_config(&config).context("Model provider")?;

    let summary = run_analysis(&config, &text_source, &client)
        .await
        .context("Report analysis failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !global.quiet {
        for r in &summary.reports {
            match (&r.error, &r.output) {
                (Some(e), _) => eprintln!("  {} {}  {}", red("✗"), r.file_name, red(e)),
                (None, Some(path)) if r.entries > 0 => eprintln!(
                    "  {} {}  {} entries → {}",
                    green("✓"),
                    r.file_name,
                    r.entries,
                    path.display()
                ),
                (None, _) => eprintln!(
                    "  {} {}  {}",
                    yellow("⚠"),
                    r.file_name,
                    yellow("no usable analysis, wrote empty statistics")
                ),
            }
        }
        eprintln!(
            "{} {} entries from {} reports",
            green("✔"),
            bold(&summary.total_entries().to_string()),
            summary.reports.len()
        );
    }
    Ok(())
}

// ── search ───────────────────────────────────────────────────────────────

async fn run_search(global: &GlobalArgs, settings: &Settings, args: &SearchArgs) -> Result<()> {
    let config = base_config(global, settings)
        .build()
        .context("Invalid configuration")?;

    let embedder = create_embedder().await.context("Embedding model")?;
    let store = ExamStore::open_existing(&config.db_path, &config.collection, embedder)
        .await
        .context("Failed to open vector store")?;
    let client = Arc::new(LlmExtractionClient::from_config(&config).context("Model provider")?);
    let stats = StatsTable::load_dir(&config.stats_dir).context("Failed to load statistics")?;
    let service = SearchService::new(&config, store, client, stats);

    if let Some(ref query) = args.query {
        let outcome = service.find(query, args.topic).await.context("Search failed")?;
        render_outcome(&outcome, args.show_candidates);
        return Ok(());
    }

    eprintln!(
        "{} {}  {}",
        cyan("◆"),
        bold("Cambridge Part IA StudyBot"),
        dim(&format!("topic: {}  (empty line to skip, 'quit' to exit)", args.topic))
    );
    let stdin = io::stdin();
    loop {
        eprint!("{} ", bold("query>"));
        io::stderr().flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("Failed to read stdin")? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }
        match service.find(line, args.topic).await {
            Ok(outcome) => render_outcome(&outcome, args.show_candidates),
            Err(e) => eprintln!("{} {e:#}", red("✘")),
        }
    }
    Ok(())
}

fn render_outcome(outcome: &SearchOutcome, show_candidates: bool) {
    let rule = dim(&"─".repeat(60));
    match outcome {
        SearchOutcome::EmptyQuery => eprintln!("{}", yellow("Please enter a search term.")),
        SearchOutcome::NoResults => eprintln!("{}", red("No questions found.")),
        SearchOutcome::Malformed { reason, raw } => {
            eprintln!("{} {}", red("Parsing error:"), reason);
            println!("{raw}");
        }
        SearchOutcome::Found(result) => {
            let sel = &result.selection;
            let year = sel.year.map(|y| y.to_string()).unwrap_or_else(|| "?".into());
            let paper = sel.paper.map(|p| p.to_string()).unwrap_or_else(|| "?".into());
            let question = sel.question.as_deref().unwrap_or("?");

            println!(
                "{}",
                bold(&format!("Selected Question (Year {year}, Paper {paper}, Q{question})"))
            );
            println!("{rule}");
            println!("{}", sel.question_markdown);
            println!("{rule}");
            println!("{}", cyan("Hint"));
            println!("{}", sel.hint);
            println!("{rule}");
            println!("{}", cyan("Examiner's Stats"));
            match &result.stats {
                StatsLookup::Found(stat) => {
                    println!("  Difficulty: {}/10", stat.difficulty);
                    match stat.popularity {
                        Some(p) => println!("  Popularity: {p}/10"),
                        None => println!("  Popularity: ?/10"),
                    }
                    if !stat.topic.is_empty() {
                        println!("  Topic:      {}", stat.topic);
                    }
                    let mistakes = if stat.mistakes.is_empty() {
                        "No data"
                    } else {
                        stat.mistakes.as_str()
                    };
                    println!("  {} {}", yellow("Main mistake:"), mistakes);
                }
                StatsLookup::PaperMissing { year, paper } => println!(
                    "  {}",
                    yellow(&format!("No data found for {year} Paper {paper}."))
                ),
                StatsLookup::QuestionMissing {
                    normalized,
                    available,
                } => {
                    println!(
                        "  {}",
                        dim(&format!(
                            "Available questions for this paper: {}",
                            available.join(", ")
                        ))
                    );
                    println!("  {}", yellow(&format!("Could not find stats for Q{normalized}")));
                }
                StatsLookup::Unidentified => println!(
                    "  {}",
                    yellow("Question not identified; no statistics to look up.")
                ),
            }
            if show_candidates {
                println!("{rule}");
                for c in &result.candidates {
                    println!(
                        "  {}",
                        dim(&format!(
                            "{}  {}  score {:.3}",
                            c.record.id, c.record.topic, c.score
                        ))
                    );
                }
            }
        }
    }
}

// ── inspect ──────────────────────────────────────────────────────────────

async fn run_inspect(global: &GlobalArgs, settings: &Settings) -> Result<()> {
    let config = base_config(global, settings)
        .build()
        .context("Invalid configuration")?;

    let embedder = create_embedder().await.context("Embedding model")?;
    let store = ExamStore::open_existing(&config.db_path, &config.collection, embedder)
        .await
        .context("Failed to open vector store")?;
    let stats = StatsTable::load_dir(&config.stats_dir).context("Failed to load statistics")?;

    println!("Store:        {}", store.path().display());
    println!("Collection:   {}", store.collection());
    println!("Records:      {}", store.count().await?);
    for (year, n) in store.count_by_year().await? {
        println!("  {year}:       {n} pages");
    }

    println!("Statistics:   {}", config.stats_dir.display());
    if stats.is_empty() {
        println!("  (none; run `studybot analyze`)");
    }
    for (year, paper, questions) in stats.overview() {
        println!("  {year} Paper {paper}: {questions} questions");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bar_exists_only_once_ingestion_starts() {
        let progress = CliIngestProgress::new();
        // events before the start are ignored, not drawn
        progress.on_page_complete("2023_1_2", &PageOutcome::Processed);
        assert!(progress.bar.get().is_none());

        progress.on_ingest_start(1, 3);
        let bar = progress.bar.get().expect("bar created on start");
        assert_eq!(bar.length(), Some(3));

        progress.on_page_complete("2023_1_2", &PageOutcome::Processed);
        assert_eq!(bar.position(), 1);
        progress.on_ingest_complete(&IngestSummary::default());
        assert!(bar.is_finished());
    }

    #[test]
    fn topic_flag_accepts_slugs() {
        let cli = Cli::try_parse_from([
            "studybot",
            "search",
            "induction",
            "--topic",
            "discrete-mathematics",
        ])
        .unwrap();
        match cli.command {
            Command::Search(args) => assert_eq!(args.topic, Topic::DiscreteMathematics),
            other => panic!("unexpected {other:?}"),
        }
    }
}
