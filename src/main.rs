use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use mailtally::analysis::DEFAULT_TOP_N;
use mailtally::cleanup::{DEFAULT_BATCH_SIZE, DEFAULT_LABEL};
use mailtally::output::DEFAULT_RESULTS_FILE;
use mailtally::snapshot::DEFAULT_SNAPSHOT_FILE;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    /// Local JSON snapshot written by `fetch`
    Snapshot,
    /// Live Gmail mailbox
    Gmail,
}

#[derive(Debug, Parser)]
#[command(name = "mailtally", version, about = "Gmail sender ranking and cleanup")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output structured JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log debug detail to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch messages from Gmail into a local snapshot
    Fetch(FetchArgs),
    /// Rank the most frequent senders
    Analyze(AnalyzeArgs),
    /// Move labelled messages older than a cutoff to trash
    Clean(CleanArgs),
}

#[derive(Debug, Args)]
struct FetchArgs {
    /// Stop after this many messages (default: whole mailbox)
    #[arg(long)]
    max: Option<usize>,
    /// Snapshot file to write
    #[arg(long, env = "MAILTALLY_SNAPSHOT", default_value = DEFAULT_SNAPSHOT_FILE)]
    snapshot: PathBuf,
    /// Number of fetched messages to echo as a sample
    #[arg(long, default_value_t = 5)]
    sample: usize,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    #[arg(long, value_enum, default_value = "snapshot")]
    source: SourceArg,
    #[arg(long, env = "MAILTALLY_SNAPSHOT", default_value = DEFAULT_SNAPSHOT_FILE)]
    snapshot: PathBuf,
    /// Limit messages read from the source
    #[arg(long)]
    max: Option<usize>,
    /// Number of senders to keep
    #[arg(long, default_value_t = DEFAULT_TOP_N)]
    top: usize,
    /// Results file to write
    #[arg(long, default_value = DEFAULT_RESULTS_FILE)]
    output: PathBuf,
    /// Skip writing the results file
    #[arg(long, default_value_t = false)]
    no_save: bool,
}

#[derive(Debug, Args)]
struct CleanArgs {
    #[arg(long, env = "MAILTALLY_SNAPSHOT", default_value = DEFAULT_SNAPSHOT_FILE)]
    snapshot: PathBuf,
    /// Cutoff day, YYYY-MM-DD; prompted for when absent
    #[arg(long)]
    before: Option<String>,
    /// Gmail label the messages must carry
    #[arg(long, default_value = DEFAULT_LABEL)]
    label: String,
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    /// Only report what would be trashed
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Skip confirmation prompts
    #[arg(long, default_value_t = false)]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());
    if let Some(directive) = crate_log_directive(cli.verbose, std::env::var_os("RUST_LOG").is_some())
    {
        filter = filter.add_directive(directive.parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    commands::dispatch(cli).await
}

/// Crate-level directive added on top of the default filter. An explicit
/// `RUST_LOG` wins.
fn crate_log_directive(verbose: bool, rust_log_set: bool) -> Option<&'static str> {
    match (rust_log_set, verbose) {
        (true, _) => None,
        (false, true) => Some("mailtally=debug"),
        (false, false) => Some("mailtally=info"),
    }
}

mod commands {
    use std::io::{BufRead, Write};

    use anyhow::{bail, Context, Result};
    use chrono::NaiveDate;

    use mailtally::analysis;
    use mailtally::cleanup::{self, CleanupReport};
    use mailtally::config::{GmailScope, Settings};
    use mailtally::connectors::{GmailApiConnector, JsonSnapshotSource, MessageSource};
    use mailtally::output::table::{self, DEFAULT_PREVIEW_LIMIT};
    use mailtally::output::{ConsoleSink, JsonFileSink, OutputFormat, ResultSink};
    use mailtally::snapshot::{self, MessageRecord};

    use super::{AnalyzeArgs, CleanArgs, Cli, Commands, FetchArgs, SourceArg};

    pub async fn dispatch(cli: Cli) -> Result<()> {
        match cli.command {
            Commands::Fetch(args) => handle_fetch(args, cli.json).await,
            Commands::Analyze(args) => handle_analyze(args, cli.json).await,
            Commands::Clean(args) => handle_clean(args, cli.json).await,
        }
    }

    async fn handle_fetch(args: FetchArgs, json: bool) -> Result<()> {
        let settings = Settings::from_env()?;
        let connector = GmailApiConnector::new(&settings, GmailScope::ReadOnly);
        connector
            .authenticate()
            .await
            .context("authenticate with gmail")?;

        let (records, report) = connector.fetch_with_report(args.max).await?;
        snapshot::save(&args.snapshot, &records)
            .with_context(|| format!("write snapshot {}", args.snapshot.display()))?;

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        if !records.is_empty() && args.sample > 0 {
            println!("Sample messages (first {}):", args.sample.min(records.len()));
            println!("{}", "=".repeat(80));
            for record in records.iter().take(args.sample) {
                print_sample(record);
            }
        }

        println!("Fetch complete");
        println!("Messages listed:  {}", report.messages_listed);
        println!("Messages fetched: {}", report.messages_fetched);
        println!("Errors: {}", report.errors.len());
        for error in &report.errors {
            println!("- {error}");
        }
        println!("Snapshot saved to {}", args.snapshot.display());
        Ok(())
    }

    async fn handle_analyze(args: AnalyzeArgs, json: bool) -> Result<()> {
        let records = match args.source {
            SourceArg::Snapshot => JsonSnapshotSource::new(&args.snapshot).fetch(args.max).await?,
            SourceArg::Gmail => {
                let settings = Settings::from_env()?;
                GmailApiConnector::new(&settings, GmailScope::ReadOnly)
                    .fetch(args.max)
                    .await?
            }
        };

        if records.is_empty() {
            eprintln!("No messages to analyze.");
            return Ok(());
        }

        let ranked =
            analysis::aggregate(records.iter().map(|record| record.from.as_str()), args.top)?;

        ConsoleSink {
            format: OutputFormat::from_json_flag(json),
        }
        .emit(&ranked, records.len())?;

        if !args.no_save {
            let sink = JsonFileSink::new(&args.output);
            sink.emit(&ranked, records.len())?;
            if !json {
                println!("\nResults saved to {}", sink.path().display());
            }
        }
        Ok(())
    }

    async fn handle_clean(args: CleanArgs, json: bool) -> Result<()> {
        let cutoff = match args.before.as_deref() {
            Some(raw) => cleanup::parse_cutoff(raw)?,
            None => {
                eprintln!(
                    "Messages labelled {} dated BEFORE the cutoff will be moved to trash.",
                    args.label
                );
                cleanup::parse_cutoff(&prompt("Cutoff date (YYYY-MM-DD): ")?)?
            }
        };

        let records = JsonSnapshotSource::new(&args.snapshot).fetch(None).await?;
        let selected = cleanup::select_before(&records, &args.label, cutoff);
        if selected.is_empty() {
            eprintln!(
                "No messages labelled {} before {}.",
                args.label,
                human_date(cutoff)
            );
            return Ok(());
        }

        if !json {
            println!("{}", table::format_cleanup_preview(&selected, DEFAULT_PREVIEW_LIMIT));
        }
        let ids: Vec<String> = selected.iter().map(|record| record.id.clone()).collect();

        let settings = Settings::from_env()?;
        let connector = GmailApiConnector::new(&settings, GmailScope::Modify);

        if args.dry_run {
            let report = cleanup::trash_in_batches(&connector, &ids, args.batch_size, true).await?;
            return print_clean_report(&report, true, json);
        }

        eprintln!(
            "\nWARNING: this will move {} messages to trash (restorable for 30 days).",
            ids.len()
        );

        if !args.yes && !confirm_clean(&connector, &ids, args.batch_size, json).await? {
            eprintln!("Cleanup cancelled.");
            return Ok(());
        }

        connector
            .authenticate()
            .await
            .context("authenticate with gmail")?;
        let report = cleanup::trash_in_batches(&connector, &ids, args.batch_size, false).await?;
        print_clean_report(&report, false, json)
    }

    async fn confirm_clean(
        connector: &GmailApiConnector,
        ids: &[String],
        batch_size: usize,
        json: bool,
    ) -> Result<bool> {
        let dry_run_first = prompt("Do you want to do a DRY RUN first? (y/n): ")?;
        if dry_run_first.eq_ignore_ascii_case("y") {
            let report = cleanup::trash_in_batches(connector, ids, batch_size, true).await?;
            print_clean_report(&report, true, json)?;
            let proceed = prompt("Proceed with moving them to trash? (yes/no): ")?;
            return Ok(proceed.eq_ignore_ascii_case("yes"));
        }

        let typed = prompt("Type 'DELETE' to confirm: ")?;
        Ok(typed == "DELETE")
    }

    fn print_clean_report(report: &CleanupReport, dry_run: bool, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }

        if dry_run {
            println!("[DRY RUN] Would move {} messages to trash", report.would_trash);
            return Ok(());
        }

        println!("Moved {} messages to trash", report.trashed);
        if report.failed > 0 {
            println!("Failed to trash {} messages", report.failed);
            for error in &report.errors {
                println!("- {error}");
            }
        }
        println!("Messages can be restored from trash within 30 days.");
        Ok(())
    }

    fn print_sample(record: &MessageRecord) {
        let snippet: String = record.snippet.chars().take(100).collect();
        println!("Subject: {}", record.subject);
        println!("From:    {}", record.from);
        println!("Date:    {}", record.date);
        println!("Snippet: {snippet}...");
        println!("{}", "-".repeat(80));
    }

    fn human_date(date: NaiveDate) -> String {
        date.format("%B %d, %Y").to_string()
    }

    fn prompt(question: &str) -> Result<String> {
        eprint!("{question}");
        std::io::stderr().flush().context("flush prompt")?;

        let mut answer = String::new();
        let read = std::io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("read answer from stdin")?;
        if read == 0 {
            bail!("stdin closed before an answer was given");
        }
        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{crate_log_directive, Cli, Commands};

    #[test]
    fn rust_log_overrides_crate_directive() {
        assert_eq!(crate_log_directive(false, false), Some("mailtally=info"));
        assert_eq!(crate_log_directive(true, false), Some("mailtally=debug"));
        assert_eq!(crate_log_directive(true, true), None);
        assert_eq!(crate_log_directive(false, true), None);
    }

    #[test]
    fn json_flag_is_global_for_clean() {
        let cli = Cli::try_parse_from([
            "mailtally",
            "clean",
            "--before",
            "2024-01-01",
            "--dry-run",
            "--json",
        ])
        .expect("parse clean args");
        assert!(cli.json);
        match cli.command {
            Commands::Clean(args) => {
                assert!(args.dry_run);
                assert_eq!(args.before.as_deref(), Some("2024-01-01"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
