//! CLI command definitions, routing, and tracing setup.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use venuebot_core::identifier::resolve_reference_uri;
use venuebot_core::{
    CapabilityDeclaration, JsonLinesPublisher, KnowledgeProvider, LookupPipeline, Maintainer,
    MaintainerDelays, Publisher, Scheduler, VenueId, adopt_venue, foursquare_factory,
    popular_venues,
};
use venuebot_foursquare::{FoursquareClient, VenueSource};
use venuebot_shared::{
    AppConfig, Request, config_file_path, init_config, load_config, load_config_from,
    set_credentials,
};
use venuebot_storage::{GraphStore, Storage};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// venuebot: enrich graph venues from Foursquare.
#[derive(Parser)]
#[command(
    name = "venuebot",
    version,
    about = "Link graph venues to Foursquare and keep their details current.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.venuebot/venuebot.toml.
    #[arg(long, env = "VENUEBOT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the enrichment service: maintain the graph and answer JSON-line
    /// requests from stdin until interrupted.
    Serve,

    /// Enrich one node now and print the stored result.
    Lookup {
        /// URI of the node to enrich.
        node: String,

        /// Venue id or `foursquare://venues/<id>` reference to use instead of
        /// the node's own cross-reference.
        #[arg(long)]
        venue: Option<String>,
    },

    /// Search Foursquare for venues near a place.
    Search {
        /// Place to search near (e.g. "Chicago, IL").
        #[arg(long)]
        near: String,

        /// Optional query string.
        #[arg(short, long)]
        query: Option<String>,

        /// Maximum number of results (defaults to the configured limit).
        #[arg(short, long)]
        limit: Option<u32>,

        /// Add the venue with this id from the results to the graph.
        #[arg(long, value_name = "VENUE_ID")]
        add: Option<String>,
    },

    /// List graph venues with the most events.
    Top {
        /// Maximum number of venues (defaults to the configured limit).
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
    /// Store Foursquare client credentials.
    SetCredentials {
        #[arg(long)]
        client_id: String,
        #[arg(long)]
        client_secret: String,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout carries
/// protocol messages.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "venuebot=info",
        1 => "venuebot=debug",
        _ => "venuebot=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Serve => cmd_serve(&resolve_config(config_path)?).await,
        Command::Lookup { node, venue } => {
            cmd_lookup(&resolve_config(config_path)?, &node, venue.as_deref()).await
        }
        Command::Search {
            near,
            query,
            limit,
            add,
        } => {
            let config = resolve_config(config_path)?;
            cmd_search(&config, &near, query.as_deref(), limit, add.as_deref()).await
        }
        Command::Top { limit } => cmd_top(&resolve_config(config_path)?, limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
            ConfigAction::SetCredentials {
                client_id,
                client_secret,
            } => cmd_config_set_credentials(&client_id, &client_secret).await,
        },
    }
}

/// Load the config from `--config`, or the default location.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

type LinePublisher = JsonLinesPublisher<Box<dyn Write + Send>>;

/// The collaborators every graph command works with.
struct Runtime {
    scheduler: Scheduler,
    store: Arc<Storage>,
    publisher: Arc<LinePublisher>,
    pipeline: Arc<LookupPipeline>,
}

impl Runtime {
    /// Open the graph and wire the pipeline. Node events are written to
    /// `events`: stdout for `serve`, stderr for one-shot commands.
    async fn open(config: &AppConfig, events: Box<dyn Write + Send>) -> Result<Self> {
        let path = config.storage_path()?;
        info!(path = %path.display(), "opening graph database");
        let store = Arc::new(Storage::open(&path, config.bot.node_base.as_str()).await?);
        let scheduler = Scheduler::current()?;
        let publisher = Arc::new(JsonLinesPublisher::new(events));
        let pipeline = LookupPipeline::new(
            scheduler.clone(),
            Arc::clone(&store) as Arc<dyn GraphStore>,
            Arc::clone(&publisher) as Arc<dyn Publisher>,
            foursquare_factory(config.foursquare.clone()),
            config.bot.identity.as_str(),
        );
        Ok(Self {
            scheduler,
            store,
            publisher,
            pipeline,
        })
    }

    /// Apply the configured credentials; returns whether a source is available.
    fn configure(&self, config: &AppConfig) -> Result<bool> {
        self.pipeline.configure(config.credentials().as_ref())?;
        Ok(self.pipeline.is_configured())
    }
}

fn missing_credentials(config: &AppConfig) -> color_eyre::Report {
    eyre!(
        "no Foursquare credentials: run `venuebot config set-credentials` or set {} and {}",
        config.foursquare.client_id_env,
        config.foursquare.client_secret_env
    )
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(config: &AppConfig) -> Result<()> {
    let runtime = Runtime::open(config, Box::new(std::io::stdout())).await?;
    if !runtime.configure(config)? {
        warn!("no Foursquare credentials; lookups will fail until configured");
    }

    let maintainer = Maintainer::new(
        runtime.scheduler.clone(),
        Arc::clone(&runtime.store) as Arc<dyn GraphStore>,
        Arc::clone(&runtime.pipeline),
        MaintainerDelays::from(&config.maintainer),
    );
    maintainer.on_configuration_ready();

    let provider = KnowledgeProvider::new(
        CapabilityDeclaration::spatial_things(),
        runtime.scheduler.clone(),
        Arc::clone(&runtime.store) as Arc<dyn GraphStore>,
        Arc::clone(&runtime.pipeline),
        Arc::clone(&runtime.publisher) as Arc<dyn Publisher>,
    );

    info!("serving requests from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => dispatch_line(&runtime, &provider, &line),
                None => {
                    info!("request input closed; maintaining until interrupted");
                    tokio::signal::ctrl_c().await?;
                    break;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }

    info!("shutting down");
    Ok(())
}

/// Decode one request line and hand it to the provider. The response is
/// written when its promise settles.
fn dispatch_line(runtime: &Runtime, provider: &KnowledgeProvider, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "ignoring malformed request");
            return;
        }
    };

    let Some(promise) = provider.handle_request(&request) else {
        debug!(request = ?request.id, "request not handled");
        return;
    };

    let publisher = Arc::clone(&runtime.publisher);
    let request_id = request.id;
    let _ = runtime.scheduler.defer(async move {
        match promise.await {
            Ok(Some(response)) => {
                if let Err(e) = publisher.send(&response) {
                    warn!(request = ?request_id, error = %e, "failed to write response");
                }
            }
            Ok(None) => debug!(request = ?request_id, "no results"),
            Err(e) => warn!(request = ?request_id, error = %e, "request failed"),
        }
        Ok(())
    });
}

async fn cmd_lookup(config: &AppConfig, node: &str, venue: Option<&str>) -> Result<()> {
    let runtime = Runtime::open(config, Box::new(std::io::stderr())).await?;
    if !runtime.configure(config)? {
        return Err(missing_credentials(config));
    }

    // Accept a bare id as well as a full reference.
    let reference = venue.map(|v| match resolve_reference_uri(v) {
        Some(_) => v.to_string(),
        None => VenueId::new(v).reference_uri(),
    });

    info!(node, venue = ?reference, "looking up venue details");
    let result = runtime.pipeline.enrich(node, reference.as_deref()).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_search(
    config: &AppConfig,
    near: &str,
    query: Option<&str>,
    limit: Option<u32>,
    add: Option<&str>,
) -> Result<()> {
    let credentials = config
        .credentials()
        .ok_or_else(|| missing_credentials(config))?;
    let client = FoursquareClient::new(credentials, &config.foursquare)?;
    let limit = limit.unwrap_or(config.search.limit);

    info!(near, query, limit, "searching venues");
    let venues = client.search(near, query, limit).await?;
    if venues.is_empty() {
        println!("No venues found near {near}.");
        return Ok(());
    }

    println!();
    for venue in &venues {
        let address = venue.location.address.as_deref().unwrap_or("-");
        println!("  {:<26} {:<32} {address}", venue.id, venue.name);
    }
    println!();

    let Some(id) = add else {
        return Ok(());
    };
    if !venues.iter().any(|v| v.id == id) {
        return Err(eyre!("venue '{id}' is not among the search results"));
    }

    let runtime = Runtime::open(config, Box::new(std::io::stderr())).await?;
    runtime.configure(config)?;
    let node = adopt_venue(runtime.store.as_ref(), &runtime.pipeline, &VenueId::new(id)).await?;
    println!(
        "  Added venue {id} as {}",
        node.about.as_deref().unwrap_or("<unknown>")
    );
    Ok(())
}

async fn cmd_top(config: &AppConfig, limit: Option<u32>) -> Result<()> {
    let path = config.storage_path()?;
    let store = Storage::open(&path, config.bot.node_base.as_str()).await?;
    let limit = limit.unwrap_or(config.search.limit);

    let venues = popular_venues(&store, limit).await?;
    if venues.is_empty() {
        println!("No venues with events yet.");
        return Ok(());
    }

    println!();
    for venue in &venues {
        println!(
            "  {:>5}  {:<32} {}",
            venue.degree,
            venue.name.as_deref().unwrap_or("(unnamed)"),
            venue.node
        );
    }
    println!();
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let mut config = resolve_config(path)?;
    if config.foursquare.client_secret.is_some() {
        config.foursquare.client_secret = Some("********".into());
    }
    let source = match path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# {}", source.display());
    println!("{toml_str}");
    Ok(())
}

async fn cmd_config_set_credentials(client_id: &str, client_secret: &str) -> Result<()> {
    let path = set_credentials(client_id, client_secret)?;
    println!("Credentials stored in: {}", path.display());
    Ok(())
}
