use clap::{Parser, Subcommand};
use eyre::Context;
use jiff::civil::Date;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use youtube_analytics::oauth::{self, AppCredentials, OAuthManager};
use youtube_analytics::{Dimension, Filters, Metric, Scope, YouTubeAnalytics};

/// Query YouTube Analytics reports and export them as JSON or CSV.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// OAuth client credentials file downloaded from the Google Cloud console.
    #[arg(long, env = "YT_ANALYTICS_CREDENTIALS", global = true)]
    credentials: Option<PathBuf>,

    /// Where the user's token is stored.
    #[arg(long, env = "YT_ANALYTICS_TOKEN", default_value = "token.json", global = true)]
    token: PathBuf,

    /// Scopes to request or require (short name or URL). Defaults to analytics, monetary
    /// analytics and read-only YouTube access.
    #[arg(long = "scope", global = true)]
    scopes: Vec<Scope>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Authorize access in the browser and store the resulting token.
    Auth,
    /// Run a report for a channel.
    Query(QueryArgs),
}

#[derive(Debug, clap::Args)]
struct QueryArgs {
    #[arg(long, env = "YT_ANALYTICS_CHANNEL")]
    channel: String,

    /// First day of the report (YYYY-MM-DD).
    #[arg(long)]
    since: Date,

    /// Last day of the report (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    until: Option<Date>,

    /// Metric wire name, e.g. `views` or `estimatedMinutesWatched`. Repeatable.
    #[arg(long = "metric", required = true)]
    metrics: Vec<Metric>,

    /// Dimension wire name, e.g. `day` or `month`.
    #[arg(long, default_value = "day")]
    dimension: Dimension,

    /// Restrict the report to one video.
    #[arg(long)]
    video: Option<String>,

    /// Additional `key=value` filter. Repeatable.
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,

    /// Write the report as JSON to this file.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write the report as CSV to this file.
    #[arg(long)]
    csv: Option<PathBuf>,
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    let credentials = cli
        .credentials
        .as_deref()
        .ok_or_else(|| eyre::eyre!("--credentials (or YT_ANALYTICS_CREDENTIALS) is required"))?;
    let scopes = if cli.scopes.is_empty() {
        Scope::DEFAULT.to_vec()
    } else {
        cli.scopes
    };

    match cli.command {
        Command::Auth => {
            let manager = OAuthManager::new(AppCredentials::from_file(credentials)?);
            let token = manager
                .authenticate(&scopes)
                .await
                .context("authorize user to YouTube Analytics")?;
            oauth::save_token(&cli.token, &token)?;
            tracing::info!(path = %cli.token.display(), "stored user token");
        }
        Command::Query(args) => {
            let yt = YouTubeAnalytics::new(
                args.channel,
                credentials.to_path_buf(),
                cli.token.clone(),
                Some(scopes.as_slice()),
            )?;

            let result = match (&args.video, args.filters.is_empty()) {
                (Some(video), true) => {
                    yt.video_query(video, args.since, &args.metrics, args.dimension, args.until)
                        .await
                }
                (video, _) => {
                    let mut filters: Filters = args.filters.into_iter().collect();
                    if let Some(video) = video {
                        filters.insert("video", video);
                    }
                    let filters = (!filters.is_empty()).then_some(filters);
                    yt.query(args.since, &args.metrics, args.dimension, args.until, filters)
                        .await
                }
            };

            // The token may have been refreshed even if the query itself failed.
            oauth::save_token(&cli.token, &yt.token().await)?;
            let result = result.context("run report query")?;

            if args.json.is_none() && args.csv.is_none() {
                println!("{}", result.to_json_string()?);
            }
            if let Some(path) = &args.json {
                result.save_as_json(path)?;
                tracing::info!(path = %path.display(), "wrote JSON report");
            }
            if let Some(path) = &args.csv {
                result.save_as_csv(path)?;
                tracing::info!(path = %path.display(), "wrote CSV report");
            }
        }
    }

    Ok(())
}
