//! buildcommit daemon
//!
//! ## Commands
//!
//! - `serve`: consume commit requests (JSON lines on stdin), commit the
//!   changed files and write one status per request (JSON lines on stdout)
//! - `diff`: print the changed files between two builds in an artifact root

mod stdio;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use build_artifacts::FsArtifactStore;
use buildcommit_core::metrics::METRICS;
use buildcommit_core::{
    ArtifactDiffResolver, BusStatusPublisher, DiffResolver, DiffServiceClient, DiffServiceConfig,
    GitDataClient, HttpTokenBroker, InMemoryBus, InstallationAuthenticator, PipelineConfig,
    RepositoryHostConfig, RequestDispatcher, StaticTokenAuthenticator, TokenBrokerConfig,
};
use clap::{Args, Parser, Subcommand};
use tokio::io::BufReader;
use tracing::{info, warn, Level};

use crate::stdio::{feed_lines, JsonLinesProducer};

#[derive(Parser)]
#[command(name = "buildcommitd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Commits build output to its repository and reports the outcome",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over requests read from stdin
    Serve(ServeArgs),

    /// Show the files that changed between two builds
    Diff {
        /// Artifact root laid out as <resource>/<build>/<files>
        #[arg(long, env = "BUILDCOMMIT_ARTIFACTS_DIR")]
        artifacts_dir: PathBuf,

        /// Resource the builds belong to
        #[arg(long)]
        resource: String,

        /// Build to compare against (omit for the full file set)
        #[arg(long)]
        previous: Option<String>,

        /// Build to report
        #[arg(long)]
        current: String,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Resolve diffs from a local artifact root
    #[arg(long, env = "BUILDCOMMIT_ARTIFACTS_DIR", conflicts_with = "diff_service")]
    artifacts_dir: Option<PathBuf>,

    /// Resolve diffs through the external diff service at this URL
    #[arg(long, env = "BUILDCOMMIT_DIFF_SERVICE_URL")]
    diff_service: Option<String>,

    /// Pre-issued installation tokens as `inst=token,...`; without it,
    /// tokens are exchanged using BUILDCOMMIT_APP_TOKEN
    #[arg(long, env = "BUILDCOMMIT_INSTALLATION_TOKENS", hide_env_values = true)]
    installation_tokens: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    buildcommit_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Serve(args) => cmd_serve(args).await,
        Commands::Diff {
            artifacts_dir,
            resource,
            previous,
            current,
        } => cmd_diff(&artifacts_dir, &resource, previous.as_deref(), &current).await,
    }
}

fn build_diff_resolver(args: &ServeArgs) -> Result<Arc<dyn DiffResolver>> {
    match (&args.artifacts_dir, &args.diff_service) {
        (Some(root), _) => {
            let store = FsArtifactStore::new(root)
                .with_context(|| format!("Failed to open artifact root {}", root.display()))?;
            info!(root = %root.display(), "Resolving diffs from artifact store");
            Ok(Arc::new(ArtifactDiffResolver::new(Arc::new(store))))
        }
        (None, Some(url)) => {
            let mut config = match DiffServiceConfig::from_env() {
                Ok(config) => config,
                Err(_) => DiffServiceConfig::new(url),
            };
            config.base_url = url.trim_end_matches('/').to_string();
            info!(config = ?config, "Resolving diffs through diff service");
            let client =
                DiffServiceClient::new(config).context("Failed to build diff service client")?;
            Ok(Arc::new(client))
        }
        (None, None) => bail!("one of --artifacts-dir or --diff-service is required"),
    }
}

fn build_authenticator(args: &ServeArgs) -> Result<Arc<dyn InstallationAuthenticator>> {
    if let Some(spec) = &args.installation_tokens {
        let auth = StaticTokenAuthenticator::parse(spec).context("Invalid installation tokens")?;
        if auth.is_empty() {
            warn!("No installation tokens configured; every commit will fail authentication");
        }
        info!(installations = auth.len(), "Using pre-issued installation tokens");
        return Ok(Arc::new(auth));
    }
    let config = TokenBrokerConfig::from_env()
        .context("Set --installation-tokens or BUILDCOMMIT_APP_TOKEN")?;
    info!(config = ?config, "Exchanging installation tokens with the host");
    Ok(Arc::new(
        HttpTokenBroker::new(config).context("Failed to build token broker client")?,
    ))
}

async fn cmd_serve(args: ServeArgs) -> Result<()> {
    let config = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    let host = RepositoryHostConfig::from_env().context("Invalid repository host configuration")?;

    let diff = build_diff_resolver(&args)?;
    let auth = build_authenticator(&args)?;
    let repository = Arc::new(
        GitDataClient::new(host, auth).context("Failed to build repository host client")?,
    );

    let bus = Arc::new(InMemoryBus::new(config.partitions, config.channel_capacity));
    bus.create_topic(&config.inbound_topic)?;
    let inbound = bus.subscribe(&config.inbound_topic)?;

    let sink = Arc::new(JsonLinesProducer::new(tokio::io::stdout()));
    let publisher = Arc::new(BusStatusPublisher::new(sink, config.status_topic.clone()));
    let dispatcher = Arc::new(RequestDispatcher::new(
        config.clone(),
        diff,
        repository,
        publisher,
    ));

    info!(
        version = buildcommit_core::VERSION,
        inbound_topic = %config.inbound_topic,
        status_topic = %config.status_topic,
        partitions = config.partitions,
        "buildcommitd started"
    );
    let consumer = tokio::spawn(dispatcher.run(inbound));

    let stdin = BufReader::new(tokio::io::stdin());
    let fed = tokio::select! {
        fed = feed_lines(stdin, &bus, &config.inbound_topic) => fed,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; draining queued requests");
            Ok(Default::default())
        }
    };

    bus.close(&config.inbound_topic)?;
    let handled = consumer.await.context("Dispatcher task failed")?;
    METRICS.flush();

    let summary = fed?;
    info!(
        accepted = summary.accepted,
        rejected = summary.rejected,
        handled,
        "buildcommitd stopped"
    );
    Ok(())
}

async fn cmd_diff(
    artifacts_dir: &PathBuf,
    resource: &str,
    previous: Option<&str>,
    current: &str,
) -> Result<()> {
    let store = FsArtifactStore::new(artifacts_dir)
        .with_context(|| format!("Failed to open artifact root {}", artifacts_dir.display()))?;
    let resolver = ArtifactDiffResolver::new(Arc::new(store));
    let changed = resolver
        .compute_changed_files(resource, previous, current)
        .await?;
    println!("{}", serde_json::to_string_pretty(&changed)?);
    Ok(())
}
