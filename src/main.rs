use anyhow::{Context, Result};
use audiobook_organizer::catalog::{CatalogClient, CatalogSource};
use audiobook_organizer::config::Config;
use audiobook_organizer::reconcile::{Choice, ManualQuery, Reconciler};
use audiobook_organizer::relocate::{self, PlannedMove};
use audiobook_organizer::scanner::{collector, ScanOutcome, ScanRequest, Scanner};
use audiobook_organizer::tags::{FileTagStore, TagStore, WriteOptions};
use audiobook_organizer::template::PathTemplate;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const HELP: &str = "\
Usage:
  1. Pick the input directory holding your audiobook files (--input).
  2. Pick an output directory (--output), or leave it unset to organize in place.
  3. Choose the file types to include (--ext mp3,m4a,m4b,aac).
  4. Choose a catalog (--source open-library|google-books). Google Books needs
     an API key (--api-key or GOOGLE_BOOKS_API_KEY).
  5. `scan` lists files with missing artist, title or album together with
     catalog matches guessed from their filenames.
  6. `scan --interactive` walks those files: pick a match by number, `s` to
     skip, `m` for a manual title/author/series search, `n`/`p` to move
     between files. `scan --match-all` applies every file's best match.
  7. --set-title also replaces the title tag with the book title.
  8. Path patterns use {artist}, {title}, {album}, {tracknumber}, {year},
     {genre} and {ext}, e.g. {artist}/{album}/{title}/{title}.{ext}
  9. `preview` shows where each file would go; `organize` moves them after
     asking for confirmation. Existing files are never overwritten: a
     ' (1)', ' (2)', ... suffix is added instead.
 10. `config --save` stores the given options as defaults.";

#[derive(Parser)]
#[command(name = "audiobook-organizer", version)]
#[command(about = "Fill in missing audiobook tags from book catalogs and organize files into folders")]
#[command(after_long_help = HELP)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Find files with missing metadata and look up catalog matches
    Scan {
        #[command(flatten)]
        options: Options,
        /// Apply the best match to every file
        #[arg(long, conflicts_with = "interactive")]
        match_all: bool,
        /// Review each file and pick a match
        #[arg(long)]
        interactive: bool,
    },
    /// Manual catalog search, optionally applied to one file
    Search {
        #[command(flatten)]
        options: Options,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        author: String,
        /// Only used by Open Library
        #[arg(long, default_value = "")]
        series: String,
        /// File to update with the chosen match
        #[arg(long, requires = "pick")]
        file: Option<PathBuf>,
        /// 1-based index of the match to apply
        #[arg(long, requires = "file")]
        pick: Option<usize>,
    },
    /// Show where files would be moved
    Preview {
        #[command(flatten)]
        options: Options,
    },
    /// Move files into the pattern layout
    Organize {
        #[command(flatten)]
        options: Options,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Show the effective settings
    Config {
        #[command(flatten)]
        options: Options,
        /// Save them as the new defaults
        #[arg(long)]
        save: bool,
    },
}

/// Settings shared by every command; each overrides the saved config.
#[derive(Args, Debug, Default)]
struct Options {
    /// Directory to scan recursively
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,
    /// Output directory (defaults to the input directory)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
    /// File types to include
    #[arg(long, value_delimiter = ',')]
    ext: Vec<String>,
    /// Path pattern
    #[arg(long, short = 'p')]
    pattern: Option<String>,
    /// Catalog to search first
    #[arg(long)]
    source: Option<CatalogSource>,
    #[arg(long, env = "GOOGLE_BOOKS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// Replace the title tag with the book title
    #[arg(long)]
    set_title: bool,
}

impl Options {
    fn apply(self, config: &mut Config) {
        if let Some(input) = self.input {
            config.input_dir = Some(input);
        }
        if let Some(output) = self.output {
            config.output_dir = Some(output);
        }
        if !self.ext.is_empty() {
            config.extensions = self.ext;
        }
        if let Some(pattern) = self.pattern {
            config.path_pattern = pattern;
        }
        if let Some(source) = self.source {
            config.catalog = source;
        }
        if let Some(key) = self.api_key {
            config.google_books_api_key = Some(key);
        }
        if self.set_title {
            config.set_title = true;
        }
    }
}

fn load_config(options: Options) -> Result<Config> {
    let mut config = Config::load()?;
    options.apply(&mut config);
    Ok(config)
}

fn input_dir(config: &Config) -> Result<PathBuf> {
    config
        .input_dir
        .clone()
        .context("Please select an input directory (--input)")
}

fn extensions(config: &Config) -> Result<Vec<String>> {
    let extensions = config.normalized_extensions();
    if extensions.is_empty() {
        anyhow::bail!("Please select at least one file type (--ext)");
    }
    Ok(extensions)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Scan {
            options,
            match_all,
            interactive,
        } => scan(load_config(options)?, match_all, interactive).await,
        Command::Search {
            options,
            title,
            author,
            series,
            file,
            pick,
        } => {
            let query = ManualQuery { title, author, series };
            search(load_config(options)?, query, file.zip(pick)).await
        }
        Command::Preview { options } => {
            let config = load_config(options)?;
            let plan = plan(&config)?;
            print_plan(&plan);
            Ok(())
        }
        Command::Organize { options, yes } => organize(load_config(options)?, yes),
        Command::Config { options, save } => {
            let config = load_config(options)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                let path = config.save()?;
                info!("💾 Saved config to {}", path.display());
            }
            Ok(())
        }
    }
}

fn build(config: &Config) -> Result<(Arc<dyn TagStore>, Arc<CatalogClient>, Reconciler)> {
    let store: Arc<dyn TagStore> = Arc::new(FileTagStore::new());
    let catalog = Arc::new(CatalogClient::from_config(config)?);
    let reconciler = Reconciler::new(
        store.clone(),
        catalog.clone(),
        WriteOptions {
            set_title: config.set_title,
        },
    );
    Ok((store, catalog, reconciler))
}

async fn scan(config: Config, match_all: bool, interactive: bool) -> Result<()> {
    let request = ScanRequest {
        input_dir: input_dir(&config)?,
        extensions: extensions(&config)?,
    };
    let (store, catalog, mut reconciler) = build(&config)?;
    info!("📚 Searching {} first", catalog.preferred());

    let outcome = run_scan(Scanner::new(store, catalog), request).await?;
    if outcome.cancelled {
        warn!("⚠️  Scan stopped early, results are partial");
    }
    reconciler.load(outcome);

    if reconciler.pending_count() == 0 {
        println!("No files with missing metadata");
        return Ok(());
    }

    if match_all {
        let report = reconciler.apply_all_best().await;
        for (path, message) in &report.failed {
            println!("❌ {}: {}", path.display(), message);
        }
        println!("{}", report.message());
    } else if interactive {
        review(&mut reconciler).await?;
    } else {
        print_pending(&reconciler);
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// Ask the scan to stop after the current file.
    Cancel,
    /// Leave without waiting for the scan.
    Quit,
}

#[derive(Default)]
struct Interrupts {
    seen: u32,
}

impl Interrupts {
    fn record(&mut self) -> Interrupt {
        self.seen += 1;
        if self.seen == 1 {
            Interrupt::Cancel
        } else {
            Interrupt::Quit
        }
    }
}

async fn run_scan(scanner: Scanner, request: ScanRequest) -> Result<ScanOutcome> {
    let mut handle = scanner.start(request)?;

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    bar.set_message("Scanning");

    let mut interrupts = Interrupts::default();
    loop {
        tokio::select! {
            update = handle.progress.recv() => match update {
                Some(progress) => {
                    bar.set_length(progress.total as u64);
                    bar.set_position(progress.current as u64);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => match interrupts.record() {
                Interrupt::Cancel => {
                    bar.set_message("Stopping (Ctrl-C again to quit)");
                    handle.cancel();
                }
                Interrupt::Quit => {
                    bar.abandon_with_message("Interrupted");
                    warn!("⚠️  Scan aborted");
                    std::process::exit(130);
                }
            },
        }
    }

    let outcome = handle.finish().await?;
    bar.finish_with_message(format!("Processed {} files", outcome.total_files));
    Ok(outcome)
}

fn print_pending(reconciler: &Reconciler) {
    println!("Files with missing metadata:");
    for item in reconciler.pending() {
        println!("{}", item.path.display());
        if item.candidates.is_empty() {
            println!("    (no matches)");
        }
        for (idx, candidate) in item.candidates.iter().enumerate() {
            println!("    {}. {}", idx + 1, candidate.display_label);
        }
    }
    println!("{} files need review", reconciler.pending_count());
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Walk the pending files one at a time.
async fn review(reconciler: &mut Reconciler) -> Result<()> {
    let mut current = reconciler.pending().next().map(|item| item.path.clone());

    while let Some(path) = current.clone() {
        let choices = reconciler.choices(&path)?;
        println!();
        println!("📖 {}", path.display());
        for (idx, choice) in choices.iter().enumerate() {
            println!("  {}. {}", idx, choice.label());
        }

        let answer = prompt("Match number, [s]kip, [m]anual search, [n]ext, [p]revious, [q]uit: ")?;
        match answer.as_str() {
            "q" => break,
            "s" => {
                let next = reconciler.next_pending(&path).map(Path::to_path_buf);
                reconciler.skip(&path)?;
                current = next.or_else(|| reconciler.pending().next().map(|i| i.path.clone()));
            }
            "n" => {
                current = reconciler
                    .next_pending(&path)
                    .map(Path::to_path_buf)
                    .or(Some(path));
            }
            "p" => {
                current = reconciler
                    .previous_pending(&path)
                    .map(Path::to_path_buf)
                    .or(Some(path));
            }
            "m" => {
                let query = ManualQuery {
                    title: prompt("Title: ")?,
                    author: prompt("Author: ")?,
                    series: prompt("Series: ")?,
                };
                match reconciler.manual_search(&path, &query).await {
                    Ok(0) => println!("No matches found"),
                    Ok(count) => println!("Found {} matches", count),
                    Err(e) => println!("⚠️  {}", e),
                }
            }
            other => match other.parse::<usize>() {
                Ok(index) if index < choices.len() => {
                    if let Choice::Candidate(_) = &choices[index] {
                        let next = reconciler.next_pending(&path).map(Path::to_path_buf);
                        match reconciler.apply_choice(&path, index).await {
                            Ok(_) => {
                                println!("✅ Metadata updated");
                                current = next.or_else(|| reconciler.pending().next().map(|i| i.path.clone()));
                            }
                            Err(e) => println!("❌ {}", e),
                        }
                    } else {
                        println!("Please select a valid match");
                    }
                }
                _ => println!("Unknown choice '{}'", other),
            },
        }
    }

    println!(
        "{} resolved, {} skipped, {} still pending",
        reconciler.resolved().count(),
        reconciler.skipped().count(),
        reconciler.pending_count()
    );
    Ok(())
}

async fn search(config: Config, query: ManualQuery, target: Option<(PathBuf, usize)>) -> Result<()> {
    let (_, catalog, mut reconciler) = build(&config)?;

    let Some((file, pick)) = target else {
        let matches = catalog
            .lookup_manual(&query.title, &query.author, &query.series)
            .await?;
        if matches.is_empty() {
            println!("No matches found");
        }
        for (idx, candidate) in matches.iter().enumerate() {
            println!("{}. {}", idx + 1, candidate.display_label);
        }
        return Ok(());
    };

    reconciler.add_pending(file.clone(), Vec::new());
    if reconciler.manual_search(&file, &query).await? == 0 {
        println!("No matches found");
        return Ok(());
    }
    if !reconciler.apply_choice(&file, pick).await? {
        anyhow::bail!("No match number {}", pick);
    }
    println!("✅ Metadata updated for {}", file.display());
    Ok(())
}

fn plan(config: &Config) -> Result<Vec<PlannedMove>> {
    let input = input_dir(config)?;
    let output = config.effective_output_dir().unwrap_or_else(|| input.clone());
    let template = PathTemplate::parse(&config.path_pattern)?;

    let files = collector::collect_audio_files(&input, &extensions(config)?);
    let store = FileTagStore::new();
    Ok(relocate::plan_moves(&store, &files, &template, &output)?)
}

fn print_plan(plan: &[PlannedMove]) {
    for entry in plan {
        println!("{}\n    -> {}", entry.source.display(), entry.destination.display());
    }
    println!("Preview generated for {} files", plan.len());
}

fn organize(config: Config, yes: bool) -> Result<()> {
    let plan = plan(&config)?;
    if plan.is_empty() {
        println!("No files to process");
        return Ok(());
    }
    print_plan(&plan);

    if !yes {
        let answer = prompt("Are you sure you want to rename and organize the files as shown? [y/N] ")?;
        if !matches!(answer.to_lowercase().as_str(), "y" | "yes") {
            println!("Cancelled");
            return Ok(());
        }
    }

    let outcomes = relocate::execute(&plan);
    for outcome in &outcomes {
        let marker = if outcome.success { "✅" } else { "❌" };
        println!("{} {}", marker, outcome.message);
    }
    println!("Operation completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_interrupt_quits() {
        let mut interrupts = Interrupts::default();
        assert_eq!(interrupts.record(), Interrupt::Cancel);
        assert_eq!(interrupts.record(), Interrupt::Quit);
        assert_eq!(interrupts.record(), Interrupt::Quit);
    }

    #[test]
    fn test_cli_parses_scan_flags() {
        let cli = Cli::try_parse_from([
            "audiobook-organizer",
            "scan",
            "--input",
            "/books",
            "--ext",
            "mp3,m4b",
            "--source",
            "google-books",
            "--match-all",
        ])
        .unwrap();
        let Command::Scan { options, match_all, interactive } = cli.command else {
            panic!("expected scan");
        };
        assert!(match_all);
        assert!(!interactive);

        let mut config = Config::default();
        options.apply(&mut config);
        assert_eq!(config.input_dir, Some(PathBuf::from("/books")));
        assert_eq!(config.extensions, vec!["mp3", "m4b"]);
        assert_eq!(config.catalog, CatalogSource::GoogleBooks);
    }
}
