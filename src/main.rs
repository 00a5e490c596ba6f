use anyhow::{Context, Result};
use citation_harvester::config::{
    find_config_file, get_config, load_config, load_env_config, save_config, Config,
    RetryPolicyKind, CONFIG_FILE_NAME,
};
use citation_harvester::export::ExportFormat;
use citation_harvester::harvest::Harvester;
use citation_harvester::listing::ListingResolver;
use citation_harvester::models::CitationStyle;
use citation_harvester::session::ChromiumSessionFactory;
use citation_harvester::ui;
use citation_harvester::utils::HttpClient;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Citation Harvester - Extract citations, abstracts and affiliations from journal issue listings
#[derive(Parser, Debug)]
#[command(name = "citation-harvester")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "hongkongkiwi")]
#[command(
    about = "Extract citations, abstracts and author affiliations from journal issue listings",
    long_about = None
)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress everything but errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract every article of a listing and export the records
    #[command(alias = "s")]
    Scrape {
        /// Issue listing URL
        listing_url: String,

        /// Citation style (e.g. chicago, apa, mla)
        #[arg(long, short)]
        style: Option<CitationStyle>,

        /// Number of articles extracted in parallel
        #[arg(long, short)]
        workers: Option<usize>,

        /// Output path without extension
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Export format (repeatable)
        #[arg(long, short, value_enum)]
        format: Vec<ExportFormat>,

        /// Give up on an article after this many attempts
        #[arg(long, conflicts_with = "unbounded_retry")]
        max_attempts: Option<u32>,

        /// Retry failing articles until they succeed
        #[arg(long)]
        unbounded_retry: bool,

        /// Show the browser window
        #[arg(long)]
        headful: bool,
    },

    /// Print the article links found on a listing
    #[command(alias = "l")]
    Links {
        /// Issue listing URL
        listing_url: String,

        /// Print links as JSON
        #[arg(long)]
        json: bool,
    },

    /// List supported citation styles
    Styles,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Write the default configuration as TOML
    Init {
        /// Destination (default: ./citation-harvester.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

/// Load the explicit config file, else the first one found, else defaults.
///
/// Environment variables are overlaid in every case.
fn resolve_config(explicit: Option<&PathBuf>) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let config = load_config(path).with_context(|| format!("loading {}", path.display()))?;
        return Ok((config, Some(path.clone())));
    }
    match find_config_file() {
        Some(path) => {
            let config = load_config(&path).with_context(|| format!("loading {}", path.display()))?;
            Ok((config, Some(path)))
        }
        None => Ok((load_env_config().context("reading environment configuration")?, None)),
    }
}

fn init_tracing(cli: &Cli, config: &Config) {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => config.logging.level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("citation_harvester={}", level)),
    );
    let json = config.logging.is_json();

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

/// Fold scrape flags into the loaded configuration.
#[allow(clippy::too_many_arguments)]
fn apply_scrape_overrides(
    config: &mut Config,
    style: Option<CitationStyle>,
    workers: Option<usize>,
    output: Option<PathBuf>,
    format: Vec<ExportFormat>,
    max_attempts: Option<u32>,
    unbounded_retry: bool,
    headful: bool,
) {
    if let Some(style) = style {
        config.extraction.style = style;
    }
    if let Some(workers) = workers {
        config.concurrency.workers = workers.max(1);
    }
    if let Some(output) = output {
        config.output.base_path = output;
    }
    if !format.is_empty() {
        config.output.formats = format;
    }
    if let Some(max_attempts) = max_attempts {
        config.retry.policy = RetryPolicyKind::Bounded;
        config.retry.max_attempts = max_attempts.max(1);
    }
    if unbounded_retry {
        config.retry.policy = RetryPolicyKind::Unbounded;
    }
    if headful {
        config.browser.headless = false;
    }
}

fn http_client(config: &Config) -> Result<HttpClient> {
    HttpClient::with_timeout(Duration::from_secs(config.site.request_timeout_secs))
        .context("building HTTP client")
}

/// Take sole ownership of `shared` once every other handle is dropped.
async fn reclaim<T>(mut shared: Arc<T>, within: Duration) -> Option<T> {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        match Arc::try_unwrap(shared) {
            Ok(inner) => return Some(inner),
            Err(still_shared) if tokio::time::Instant::now() < deadline => {
                shared = still_shared;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(_) => return None,
        }
    }
}

async fn scrape(config: &Config, listing_url: &str, quiet: bool) -> Result<()> {
    let sessions = Arc::new(
        ChromiumSessionFactory::launch(&config.browser)
            .await
            .context("launching browser")?,
    );

    let harvester = Harvester::new(config, http_client(config)?, sessions.clone())?
        .show_progress(!quiet && ui::stderr_is_terminal());

    let result = tokio::select! {
        result = harvester.run(listing_url) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    // an interrupted run aborts its workers; they release the browser as
    // the runtime drops them
    drop(harvester);
    match reclaim(sessions, Duration::from_secs(5)).await {
        Some(sessions) => sessions.shutdown().await,
        None => tracing::warn!("Browser still in use, leaving it to exit on its own"),
    }

    let summary = match result {
        Some(result) => result?,
        None => anyhow::bail!("Interrupted"),
    };

    if !quiet {
        ui::print_summary(&summary);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, config_path) = resolve_config(cli.config.as_ref())?;
    init_tracing(&cli, &config);
    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }

    match cli.command {
        Commands::Scrape {
            listing_url,
            style,
            workers,
            output,
            format,
            max_attempts,
            unbounded_retry,
            headful,
        } => {
            apply_scrape_overrides(
                &mut config,
                style,
                workers,
                output,
                format,
                max_attempts,
                unbounded_retry,
                headful,
            );
            scrape(&config, &listing_url, cli.quiet).await?;
        }

        Commands::Links { listing_url, json } => {
            let resolver =
                ListingResolver::new(http_client(&config)?, &config.site, &config.selectors)?;
            let links = resolver.resolve(&listing_url).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&links)?);
            } else {
                for link in &links {
                    println!("{}", link);
                }
            }
        }

        Commands::Styles => {
            println!("{}", ui::styles_table(config.extraction.style));
        }

        Commands::Config { command } => match command {
            ConfigCommands::Init { path, force } => {
                let path = path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
                if path.exists() && !force {
                    anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
                }
                save_config(&get_config(), &path)?;
                ui::print_status(ui::Status::Success, &format!("wrote {}", path.display()));
            }
            ConfigCommands::Show => {
                print!("{}", toml::to_string_pretty(&config)?);
            }
        },

        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "citation-harvester",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}
