use anyhow::Context;
use clap::{ArgAction, Parser};
use hotspot_analyzer::analyzer::DEFAULT_RENAME_THRESHOLD;
use hotspot_analyzer::{AnalysisOptions, CacheStore, ExclusionFilter, HotspotAnalyzer};
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    version,
    about = "Analyzes Git repositories to identify code hotspots",
    long_about = None
)]
struct Cli {
    /// Path to Git repository
    #[arg(short, long)]
    repo: Option<PathBuf>,

    /// Only analyze commits after this date (YYYY-MM-DD or RFC 3339)
    #[arg(short, long)]
    since: Option<String>,

    /// Output format (json or csv)
    #[arg(short, long, default_value = "json", value_parser = ["json", "csv"])]
    format: String,

    /// Number of top hotspots to show (0 shows all)
    #[arg(short = 'n', long, default_value_t = 10)]
    top: usize,

    /// Additional patterns to exclude (glob format, e.g., "*.test.js", "migrations/*")
    #[arg(short = 'e', long = "exclude")]
    exclude_patterns: Vec<String>,

    /// Use no default exclude patterns
    #[arg(long)]
    no_default_excludes: bool,

    /// Show the default exclude patterns and exit
    #[arg(long)]
    show_excludes: bool,

    /// Skip files with fewer lines than this
    #[arg(long, default_value_t = 10)]
    min_lines: u64,

    /// Include merge commits in the analysis
    #[arg(long, default_value_t = false)]
    include_merges: bool,

    /// Similarity threshold (percent) for treating a delete and add as a rename
    #[arg(long, default_value_t = DEFAULT_RENAME_THRESHOLD)]
    rename_threshold: u16,

    /// Use cached results if the repository has not changed
    #[arg(long)]
    cache: bool,

    /// Clear the cached result for this analysis before running
    #[arg(long)]
    clear_cache: bool,

    /// List all cached analyses and exit
    #[arg(long)]
    list_cache: bool,

    /// Clear all cached analyses and exit
    #[arg(long)]
    clear_all_cache: bool,

    /// Cache directory (defaults to $HOTSPOT_ANALYZER_CACHE_DIR or the user cache directory)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            since: self.since.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
            use_default_excludes: !self.no_default_excludes,
            include_merges: self.include_merges,
            rename_threshold: self.rename_threshold,
            min_lines: self.min_lines,
        }
    }

    fn cache_store(&self) -> anyhow::Result<CacheStore> {
        match &self.cache_dir {
            Some(dir) => Ok(CacheStore::new(dir)),
            None => CacheStore::open_default().context("Failed to locate cache directory"),
        }
    }
}

fn init_logger(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn print_default_excludes() {
    let mut patterns = ExclusionFilter::default_patterns().to_vec();
    patterns.sort_unstable();

    println!("Default exclusion patterns:");
    for pattern in &patterns {
        println!("  {}", pattern);
    }
    println!();
    println!("Total: {} patterns", patterns.len());
    println!("Use --exclude 'pattern' to add more patterns");
    println!("Use --no-default-excludes to disable these defaults");
}

fn print_cache_list(cache: &CacheStore) -> anyhow::Result<()> {
    let entries = cache.list().context("Failed to list cached analyses")?;

    println!("Cached analyses:");
    if entries.is_empty() {
        println!("  No cached analyses found.");
    }
    for entry in &entries {
        println!();
        println!("  {}", entry.repository);
        println!("    HEAD:    {}", entry.head);
        println!("    Since:   {}", entry.since.as_deref().unwrap_or("All time"));
        println!("    Commits: {}", entry.commit_count);
        println!("    Files:   {}", entry.files);
        println!("    Cached:  {}", entry.created_at.to_rfc3339());
    }
    println!();
    println!("Cache location: {}", cache.dir().display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    if cli.show_excludes {
        print_default_excludes();
        return Ok(());
    }

    if cli.list_cache {
        return print_cache_list(&cli.cache_store()?);
    }

    if cli.clear_all_cache {
        let removed = cli
            .cache_store()?
            .invalidate_all()
            .context("Failed to clear cached analyses")?;
        println!("Cleared {} cached analyses.", removed);
        return Ok(());
    }

    let repo = cli
        .repo
        .as_ref()
        .context("--repo is required for analysis")?;

    let analyzer = HotspotAnalyzer::new(repo, cli.analysis_options())
        .context("Failed to initialize analyzer")?;

    if cli.clear_cache {
        let key = analyzer.cache_key().context("Failed to compute cache key")?;
        if cli.cache_store()?.invalidate(&key).context("Failed to clear cache")? {
            info!("Cache cleared for {}", key.repository);
        }
    }

    let mut dataset = if cli.cache {
        analyzer
            .analyze_cached(&cli.cache_store()?)
            .context("Failed to analyze repository")?
            .0
    } else {
        analyzer.analyze().context("Failed to analyze repository")?
    };

    if cli.top > 0 {
        dataset.hotspots.truncate(cli.top);
    }

    match cli.format.as_str() {
        "json" => {
            println!(
                "{}",
                serde_json::to_string_pretty(&dataset).context("Failed to serialize to JSON")?
            );
        }
        "csv" => {
            let mut wtr = csv::Writer::from_writer(std::io::stdout());
            for record in &dataset.hotspots {
                wtr.serialize(record)
                    .context("Failed to write CSV record")?;
            }
            wtr.flush().context("Failed to flush CSV writer")?;
        }
        _ => anyhow::bail!("Unsupported output format: {}", cli.format),
    }

    Ok(())
}
