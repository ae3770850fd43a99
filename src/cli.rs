//! CLI parsing and orchestration. Loads credentials, runs a collection, writes the two CSV files.
//! Maps errors to exit codes.

use crate::collector::{collect_with_progress, parse_mode, parse_timeframe, CollectError};
use crate::config::{self, ConfigError};
use crate::export::{comments_file_name, posts_file_name, write_tables, ExportError};
use crate::forum::{ApiError, ForumApi, ListingMode, RedditClient, Timeframe};
use clap::Parser;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const DEFAULT_DELAY_SECS: u64 = 1;
const DEFAULT_RETRY_COUNT: u32 = 3;
const MAX_LIMIT: u32 = 1000;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Client(#[from] ApiError),

    #[error("{0}")]
    Collect(#[from] CollectError),

    #[error("{0}")]
    Export(#[from] ExportError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_)
            | CliRunError::Config(_)
            | CliRunError::Collect(CollectError::InvalidArgument(_)) => 1,
            CliRunError::Client(_) | CliRunError::Collect(_) => 2,
            CliRunError::Export(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "subscrape")]
#[command(about = "Export a subreddit's posts and full comment trees to CSV")]
#[command(
    after_help = "Credentials are read from the [reddit] section (client_id, client_secret, user_agent) of ./subscrape.toml or ~/.config/subscrape/config.toml. Optional keys: output_dir, request_delay_secs, timeout_secs, retry_count, retry_backoff_secs. CLI flags override config."
)]
pub struct Args {
    /// Subreddit name, with or without the leading r/.
    pub forum: String,

    /// Number of posts to collect (1-1000).
    #[arg(short = 'n', long, default_value_t = 50, value_parser = parse_limit)]
    pub limit: u32,

    /// Listing: hot, new, or top.
    #[arg(short, long, default_value = "hot", value_parser = parse_listing)]
    pub listing: ListingMode,

    /// Timeframe for the top listing: all, year, month, or day. Defaults to all.
    #[arg(short, long, value_parser = parse_timeframe_arg)]
    pub timeframe: Option<Timeframe>,

    /// Directory for the CSV files. Default: config output_dir, else the current directory.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Config file path (overrides the search order).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Delay between API requests in seconds (overrides config; default 1).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Log API activity and print the full error chain on failure.
    #[arg(long)]
    pub verbose: bool,

    /// Check credentials and that the forum exists, print the output paths, and stop.
    #[arg(long)]
    pub dry_run: bool,
}

fn parse_limit(s: &str) -> Result<u32, String> {
    let n: u32 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid --limit: '{}' is not a positive number", s))?;
    if n == 0 || n > MAX_LIMIT {
        return Err(format!(
            "Invalid --limit: {} (must be between 1 and {})",
            n, MAX_LIMIT
        ));
    }
    Ok(n)
}

fn parse_listing(s: &str) -> Result<ListingMode, String> {
    parse_mode(s).map_err(|e| e.to_string())
}

fn parse_timeframe_arg(s: &str) -> Result<Timeframe, String> {
    parse_timeframe(s).map_err(|e| e.to_string())
}

/// Strip an `r/` or `/r/` prefix and check the name uses only letters, digits and underscores.
fn normalize_forum_name(input: &str) -> Result<String, CliRunError> {
    let trimmed = input.trim();
    let name = trimmed
        .strip_prefix("/r/")
        .or_else(|| trimmed.strip_prefix("r/"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');
    if name.is_empty() {
        return Err(CliRunError::InvalidInput(
            "Please enter a subreddit name.".to_string(),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(CliRunError::InvalidInput(format!(
            "Invalid subreddit name '{}': use letters, digits, and underscores only.",
            input
        )));
    }
    Ok(name.to_string())
}

/// Timeframe to request: the given one for top (all-time when omitted), none otherwise.
fn effective_timeframe(listing: ListingMode, timeframe: Option<Timeframe>) -> Option<Timeframe> {
    match listing {
        ListingMode::TopRanked => Some(timeframe.unwrap_or(Timeframe::AllTime)),
        ListingMode::RecentActivity | ListingMode::Newest => None,
    }
}

fn listing_label(listing: ListingMode) -> &'static str {
    match listing {
        ListingMode::RecentActivity => "hot",
        ListingMode::Newest => "new",
        ListingMode::TopRanked => "top",
    }
}

/// Ensure the output directory exists.
fn validate_output_dir(dir: &Path) -> Result<(), CliRunError> {
    if !dir.as_os_str().is_empty() && !dir.is_dir() {
        return Err(CliRunError::InvalidInput(format!(
            "Cannot write output: {}: directory does not exist.",
            dir.display()
        )));
    }
    Ok(())
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let forum = normalize_forum_name(&args.forum)?;

    let loaded = config::load_config(args.config.as_deref())?;
    let credentials = loaded.credentials()?;
    let config = &loaded.config;
    info!(path = %loaded.path.display(), "configuration loaded");

    let output_dir: PathBuf = args
        .output_dir
        .clone()
        .or_else(|| config.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    validate_output_dir(&output_dir)?;

    let delay_secs = args
        .delay
        .or(config.request_delay_secs)
        .unwrap_or(DEFAULT_DELAY_SECS);
    let retry_count = config.retry_count.unwrap_or(DEFAULT_RETRY_COUNT).max(1);
    let mut builder = RedditClient::builder(credentials)
        .delay_secs(delay_secs)
        .retry_count(retry_count);
    if let Some(secs) = args.timeout.or(config.timeout_secs) {
        builder = builder.timeout_secs(secs);
    }
    if let Some(backoff) = config.retry_backoff_secs.clone() {
        builder = builder.retry_backoff_secs(backoff);
    }
    let mut client = builder.build()?;

    let timeframe = effective_timeframe(args.listing, args.timeframe);

    if args.dry_run {
        if !client.forum_exists(&forum)? {
            return Err(CollectError::ForumNotFound { forum }.into());
        }
        eprintln!(
            "Would collect up to {} '{}' posts from r/{}.",
            args.limit,
            listing_label(args.listing),
            forum
        );
        eprintln!("Posts: {}", output_dir.join(posts_file_name(&forum)).display());
        eprintln!(
            "Comments: {}",
            output_dir.join(comments_file_name(&forum)).display()
        );
        return Ok(());
    }

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: u32, total: u32| {
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(total as u64);
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
            {
                bar.set_style(
                    style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                        .progress_chars("█▉▊▋▌▍▎▏ "),
                );
            }
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        pb.set_position(n as u64);
        pb.set_message(format!("Posts {}/{}", n, total));
    };
    let progress: Option<&dyn Fn(u32, u32)> = if args.quiet { None } else { Some(&progress_cb) };

    if !args.quiet {
        eprintln!(
            "Scraping {} '{}' posts from r/{}...",
            args.limit,
            listing_label(args.listing),
            forum
        );
    }
    let result = collect_with_progress(
        &mut client,
        &forum,
        args.limit,
        args.listing,
        timeframe,
        progress,
    );

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }
    let tables = result?;

    let (posts_path, comments_path) = write_tables(&tables, &forum, &output_dir)?;

    if !args.quiet {
        eprintln!(
            "Found {} posts and {} comments.",
            tables.items.len(),
            tables.comments.len()
        );
        eprintln!("Wrote {}", posts_path.display());
        eprintln!("Wrote {}", comments_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_forum_name_strips_prefix() -> Result<(), CliRunError> {
        assert_eq!(normalize_forum_name("futurology")?, "futurology");
        assert_eq!(normalize_forum_name("r/futurology")?, "futurology");
        assert_eq!(normalize_forum_name(" /r/Ask_Science/ ")?, "Ask_Science");
        Ok(())
    }

    #[test]
    fn normalize_forum_name_rejects_empty_and_bad_chars() {
        assert!(matches!(
            normalize_forum_name("  "),
            Err(CliRunError::InvalidInput(_))
        ));
        assert!(matches!(
            normalize_forum_name("r/"),
            Err(CliRunError::InvalidInput(_))
        ));
        assert!(matches!(
            normalize_forum_name("/r//"),
            Err(CliRunError::InvalidInput(_))
        ));
        assert!(matches!(
            normalize_forum_name("../etc"),
            Err(CliRunError::InvalidInput(_))
        ));
    }

    #[test]
    fn parse_limit_bounds() {
        assert_eq!(parse_limit("50"), Ok(50));
        assert_eq!(parse_limit("1000"), Ok(1000));
        assert!(parse_limit("0").is_err());
        assert!(parse_limit("1001").is_err());
        assert!(parse_limit("ten").is_err());
    }

    #[test]
    fn parse_listing_all() {
        assert_eq!(parse_listing("hot"), Ok(ListingMode::RecentActivity));
        assert_eq!(parse_listing("New"), Ok(ListingMode::Newest));
        assert_eq!(parse_listing("top"), Ok(ListingMode::TopRanked));
        assert!(parse_listing("rising").is_err());
    }

    #[test]
    fn parse_timeframe_all() {
        assert_eq!(parse_timeframe_arg("all"), Ok(Timeframe::AllTime));
        assert_eq!(parse_timeframe_arg("year"), Ok(Timeframe::Year));
        assert_eq!(parse_timeframe_arg("month"), Ok(Timeframe::Month));
        assert_eq!(parse_timeframe_arg("day"), Ok(Timeframe::Day));
        assert!(parse_timeframe_arg("hour").is_err());
    }

    #[test]
    fn top_defaults_to_all_time_and_others_drop_timeframe() {
        assert_eq!(
            effective_timeframe(ListingMode::TopRanked, None),
            Some(Timeframe::AllTime)
        );
        assert_eq!(
            effective_timeframe(ListingMode::TopRanked, Some(Timeframe::Day)),
            Some(Timeframe::Day)
        );
        assert_eq!(
            effective_timeframe(ListingMode::Newest, Some(Timeframe::Day)),
            None
        );
    }

    #[test]
    fn args_parse_defaults() {
        let args = Args::parse_from(["subscrape", "rust"]);
        assert_eq!(args.forum, "rust");
        assert_eq!(args.limit, 50);
        assert_eq!(args.listing, ListingMode::RecentActivity);
        assert!(args.timeframe.is_none());
        assert!(!args.dry_run);
    }

    #[test]
    fn args_parse_top_month() {
        let args = Args::parse_from([
            "subscrape",
            "r/rust",
            "--listing",
            "top",
            "--timeframe",
            "month",
            "-n",
            "5",
        ]);
        assert_eq!(args.listing, ListingMode::TopRanked);
        assert_eq!(args.timeframe, Some(Timeframe::Month));
        assert_eq!(args.limit, 5);
    }

    #[test]
    fn validate_output_dir_missing() {
        let result = validate_output_dir(Path::new("/nonexistent_dir_subscrape_xyz"));
        match result {
            Err(CliRunError::InvalidInput(msg)) => assert!(msg.contains("does not exist")),
            other => panic!("expected InvalidInput, got {:?}", other),
        }
        assert!(validate_output_dir(&std::env::temp_dir()).is_ok());
    }

    #[test]
    fn missing_config_file_exits_with_input_code() {
        let args = Args::parse_from([
            "subscrape",
            "rust",
            "--config",
            "/nonexistent_dir_subscrape_xyz/config.toml",
        ]);
        let err = run(&args).expect_err("config is missing");
        assert!(matches!(err, CliRunError::Config(ConfigError::Configuration { .. })));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(
            CliRunError::Config(ConfigError::CredentialField {
                path: PathBuf::from("c.toml"),
                field: "client_id"
            })
            .exit_code(),
            1
        );
        assert_eq!(
            CliRunError::Collect(CollectError::InvalidArgument("x".into())).exit_code(),
            1
        );
        assert_eq!(
            CliRunError::Collect(CollectError::ForumNotFound { forum: "x".into() }).exit_code(),
            2
        );
        assert_eq!(
            CliRunError::Client(ApiError::Authentication { reason: "x".into() }).exit_code(),
            2
        );
        assert_eq!(
            CliRunError::Export(ExportError::Write(std::io::Error::new(
                std::io::ErrorKind::Other,
                "x"
            ))).exit_code(),
            3
        );
    }
}
