//! xpand - X data archive expander CLI
//!
//! Main entry point for the xpand command-line tool.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use xpand::auth::{self, TerminalPrompter};
use xpand::cli::{self, Cli, Commands, OutputFormat};
use xpand::config::Config;
use xpand::engine::LoadSummary;
use xpand::{
    ArchiveAccount, ArchiveParser, CancelToken, EngineEvent, Reconciler, RunSummary, TweetCache,
    TweetState, TwitterClient, UserProfile, XpandError, format_duration, format_error,
    format_number_usize, format_xpand_error, logging,
};

fn main() {
    let cli = Cli::parse();
    let config = Config::load();

    if !config.output.colors {
        colored::control::set_override(false);
    }
    let quiet = cli.quiet || config.output.quiet;
    logging::init_cli_logging(quiet, cli.verbose, config.output.colors);

    let result = match &cli.command {
        Commands::Expand(args) => cmd_expand(&cli, &config, args, quiet),
        Commands::Status(args) => cmd_status(&cli, &config, args),
        Commands::Fetch(args) => cmd_fetch(&cli, &config, args, quiet),
        Commands::Config(args) => cmd_config(args),
        Commands::Completions(args) => {
            cmd_completions(args);
            Ok(())
        }
    };

    if let Err(err) = result {
        match err.downcast_ref::<XpandError>() {
            Some(e) => eprintln!("{}", format_xpand_error(e)),
            None => eprintln!("{}", format_error(&format!("{err:#}"), "", &[])),
        }
        std::process::exit(1);
    }
}

fn base_dir(cli: &Cli, config: &Config) -> PathBuf {
    cli.dir.clone().unwrap_or_else(|| config.base_dir())
}

fn to_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Everything a networked command needs, with the account already checked.
struct Session {
    parser: ArchiveParser,
    account: ArchiveAccount,
    profile: UserProfile,
    client: TwitterClient,
}

fn open_session(base: &Path, config: &Config) -> Result<Session> {
    let parser = ArchiveParser::open(base)?;
    let signer = auth::ensure_signer(base, &TerminalPrompter)?;
    let client = TwitterClient::new(signer, &config.api).map_err(XpandError::from)?;
    let profile = auth::ensure_user_profile(
        base,
        || client.verify_credentials().map_err(XpandError::from),
        |id| client.fetch_status(id).map_err(XpandError::from),
    )?;
    let account = parser.verified_account(&profile.id_str)?;
    debug!(user = %profile.screen_name, "Session ready");
    Ok(Session {
        parser,
        account,
        profile,
        client,
    })
}

fn progress_bar(len: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(to_u64(len));
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn render_event(pb: &ProgressBar, event: &EngineEvent) {
    match event {
        EngineEvent::BatchStarted {
            index,
            total,
            first_id,
            last_id,
            ..
        } => pb.set_message(format!("batch {}/{total} ({first_id}..{last_id})", index + 1)),
        EngineEvent::BatchCompleted {
            fetched, skeletons, ..
        } => {
            pb.inc(to_u64(fetched + skeletons));
            if *skeletons > 0 {
                pb.println(format!(
                    "  {} {skeletons} tweets unavailable, saved as skeletons",
                    "!".yellow()
                ));
            }
        }
        EngineEvent::RateLimited {
            cooldown,
            resume_at,
        } => pb.set_message(format!(
            "{} waiting {} (until {})",
            "rate limited,".yellow(),
            format_duration(*cooldown),
            resume_at.with_timezone(&Local).format("%H:%M:%S")
        )),
        EngineEvent::Cancelled => pb.set_message("stopping".yellow().to_string()),
    }
}

fn print_loaded(loaded: &LoadSummary) {
    println!(
        "  {} {} cached, {} with embedded owner, {} to fetch",
        "✓".green(),
        format_number_usize(loaded.cached),
        format_number_usize(loaded.embedded),
        format_number_usize(loaded.pending).bold()
    );
}

fn cmd_expand(cli: &Cli, config: &Config, args: &cli::ExpandArgs, quiet: bool) -> Result<()> {
    let base = base_dir(cli, config);
    let session = open_session(&base, config)?;

    let mut engine_config = config.engine.engine_config();
    if let Some(n) = args.batch_size {
        engine_config.batch_size = usize::from(n);
    }
    if let Some(secs) = args.cooldown {
        engine_config.cooldown = Duration::from_secs(secs);
    }

    if !quiet {
        println!("{}", "Expanding X data archive...".bold().cyan());
        println!("  Archive: {}", base.display());
        println!("  Account: @{}", session.profile.screen_name);
    }

    let records = session
        .parser
        .parse_tweets(&session.account.account_id)?;

    let token = CancelToken::new();
    token.install_interrupt_handler()?;

    let pb = progress_bar(0, quiet);
    let observer = pb.clone();
    let mut engine = Reconciler::new(
        session.client,
        TweetCache::new(&base),
        session.profile.id_str.clone(),
        engine_config,
    )
    .with_cancel_token(token)
    .with_observer(move |event| render_event(&observer, event));

    let loaded = engine.load_tweets(records)?;
    if !quiet {
        pb.suspend(|| print_loaded(&loaded));
    }
    pb.set_length(to_u64(args.max.map_or(loaded.pending, |m| m.min(loaded.pending))));

    let outcome = engine.process_tweets(args.force, args.max);
    pb.finish_and_clear();
    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            if e.is_resumable() {
                warn!(
                    pending = engine.pending().len(),
                    "Run stopped early, finished batches are kept"
                );
            }
            return Err(e.into());
        }
    };

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text if !quiet => print_run_summary(&summary, &base),
        OutputFormat::Text => {}
    }
    Ok(())
}

fn print_run_summary(summary: &RunSummary, base: &Path) {
    println!();
    if summary.cancelled {
        println!("{}", "Interrupted.".yellow().bold());
    } else if summary.remaining == 0 {
        println!("{}", "Archive fully expanded.".green().bold());
    } else {
        println!("{}", "Run finished.".bold());
    }
    println!("  {:<22} {:>10}", "Fetched:", format_number_usize(summary.fetched));
    println!("  {:<22} {:>10}", "Unavailable (skeleton):", format_number_usize(summary.skeletons));
    println!("  {:<22} {:>10}", "Saved:", format_number_usize(summary.saved));
    if summary.cooldowns > 0 {
        println!("  {:<22} {:>10}", "Rate-limit waits:", summary.cooldowns);
    }
    println!("  {:<22} {:>10}", "Still pending:", format_number_usize(summary.remaining));
    println!(
        "  Output: {}",
        base.join(xpand::cache::CACHE_DIR).display().to_string().dimmed()
    );
    if summary.remaining > 0 {
        println!("\n  {} re-run `xpand expand` to continue", "Hint:".cyan());
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    account_id: String,
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    tweets: usize,
    cached: usize,
    embedded: usize,
    pending: usize,
    cached_outside_archive: usize,
    credentials: CredentialStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    data_files: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CredentialStatus {
    consumer: bool,
    access: bool,
    user: bool,
}

fn cmd_status(cli: &Cli, config: &Config, args: &cli::StatusArgs) -> Result<()> {
    let base = base_dir(cli, config);
    let parser = ArchiveParser::open(&base)?;
    let account = parser.parse_account()?;
    let records = parser.parse_tweets(&account.account_id)?;

    let cache = TweetCache::new(&base);
    let on_disk: HashSet<u64> = cache.cached_ids()?.into_iter().collect();
    let archive_ids: HashSet<u64> = records.iter().map(|r| r.id).collect();

    let mut report = StatusReport {
        account_id: account.account_id.clone(),
        username: account.username.clone(),
        display_name: account.display_name.clone(),
        tweets: records.len(),
        cached: 0,
        embedded: 0,
        pending: 0,
        cached_outside_archive: on_disk.difference(&archive_ids).count(),
        credentials: CredentialStatus {
            consumer: base.join(auth::CONSUMER_FILE).is_file(),
            access: base.join(auth::ACCESS_FILE).is_file(),
            user: base.join(auth::USER_FILE).is_file(),
        },
        data_files: if args.files {
            parser.list_data_files()?
        } else {
            Vec::new()
        },
    };
    for record in &records {
        if on_disk.contains(&record.id) {
            report.cached += 1;
        } else if record.has_owner() {
            report.embedded += 1;
        } else {
            report.pending += 1;
        }
    }

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_status(&report, &base),
    }
    Ok(())
}

fn print_status(report: &StatusReport, base: &Path) {
    let mark = |ok: bool| if ok { "✓".green() } else { "✗".red() };

    println!("{}", "Archive Status".bold().cyan());
    println!("{}", "─".repeat(40));
    println!("  {:<20} {}", "Archive:", base.display());
    println!(
        "  {:<20} {}{}",
        "Account:",
        report.account_id,
        report
            .username
            .as_deref()
            .map(|u| format!(" (@{u})"))
            .unwrap_or_default()
    );
    if let Some(name) = &report.display_name {
        println!("  {:<20} {}", "Name:", name);
    }
    println!("  {:<20} {:>10}", "Tweets:", format_number_usize(report.tweets));
    println!("  {:<20} {:>10}", "Expanded:", format_number_usize(report.cached));
    println!("  {:<20} {:>10}", "Embedded owner:", format_number_usize(report.embedded));
    println!(
        "  {:<20} {:>10}",
        "Pending:",
        format_number_usize(report.pending).bold()
    );
    if report.cached_outside_archive > 0 {
        println!(
            "  {:<20} {:>10}",
            "Other cached:",
            format_number_usize(report.cached_outside_archive)
        );
    }
    println!("{}", "─".repeat(40));
    println!(
        "  {} {}  {} {}  {} {}",
        mark(report.credentials.consumer),
        auth::CONSUMER_FILE,
        mark(report.credentials.access),
        auth::ACCESS_FILE,
        mark(report.credentials.user),
        auth::USER_FILE
    );
    if !report.data_files.is_empty() {
        println!("{}", "─".repeat(40));
        for file in &report.data_files {
            println!("  {}", file.dimmed());
        }
    }
}

fn cmd_fetch(cli: &Cli, config: &Config, args: &cli::FetchArgs, quiet: bool) -> Result<()> {
    let base = base_dir(cli, config);
    let session = open_session(&base, config)?;
    let records = session
        .parser
        .parse_tweets(&session.account.account_id)?;

    let token = CancelToken::new();
    token.install_interrupt_handler()?;

    let mut engine = Reconciler::new(
        session.client,
        TweetCache::new(&base),
        session.profile.id_str.clone(),
        config.engine.engine_config(),
    )
    .with_cancel_token(token);
    if !quiet {
        engine = engine.with_observer(|event| {
            if let EngineEvent::RateLimited { resume_at, .. } = event {
                eprintln!(
                    "{} rate limited, waiting until {}",
                    "!".yellow(),
                    resume_at.with_timezone(&Local).format("%H:%M:%S")
                );
            }
        });
    }
    engine.load_tweets(records.into_iter().filter(|r| r.id == args.id))?;

    let Some(record) = engine.refresh_one(args.id, args.force)? else {
        anyhow::bail!("Interrupted before tweet {} was fetched", args.id);
    };

    match cli.format {
        OutputFormat::Json => {
            let contents = record
                .contents
                .as_ref()
                .context("fetched tweet has no contents")?;
            println!("{}", serde_json::to_string_pretty(contents)?);
        }
        OutputFormat::Text if quiet => {}
        OutputFormat::Text => {
            let location = record
                .saved_location
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            let status = match record.state {
                TweetState::Cached => "already cached (use --force to refetch)".yellow(),
                TweetState::Skeleton => "not available, saved as skeleton".yellow(),
                _ => "fetched".green(),
            };
            println!("  {} {}: {status}", "✓".green(), record.id);
            println!("  {}", location.dimmed());
        }
    }
    Ok(())
}

fn cmd_config(args: &cli::ConfigArgs) -> Result<()> {
    let path = Config::user_config_path();

    if args.init {
        match &path {
            Some(p) if p.exists() => {
                println!("{} {}", "Config already exists:".yellow(), p.display());
            }
            _ => {
                let written = Config::default()
                    .save()
                    .context("writing default config")?;
                println!("{} {}", "Wrote".green(), written.display());
            }
        }
        if !args.show {
            return Ok(());
        }
    }

    let config = Config::load();
    println!("{}", "Current Configuration".bold().cyan());
    match path {
        Some(p) if p.exists() => println!("  File: {}", p.display()),
        Some(p) => println!("  File: {} {}", p.display(), "(not present)".dimmed()),
        None => println!("  File: {}", "(no config directory)".dimmed()),
    }
    println!();
    print!(
        "{}",
        toml::to_string_pretty(&config).context("rendering configuration")?
    );
    Ok(())
}

fn cmd_completions(args: &cli::CompletionsArgs) {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "xpand", &mut io::stdout());
}
