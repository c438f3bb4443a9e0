//! Gremlin gateway CLI.
//!
//! `serve` runs the HTTP gateway; `query` sends one query straight to a
//! Gremlin server and prints the result.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use gremlin_gateway::config::endpoint_url;
use gremlin_gateway::{
    translate, Credentials, GatewayArgs, GatewayConfig, GatewayError, QueryGateway,
};
use gremlin_gateway_telemetry::{
    log_startup, LogFormat, Telemetry, TelemetryConfig, DEFAULT_SERVICE_NAME,
};

#[derive(Parser, Debug)]
#[command(
    name = "gremlin-gateway",
    about = "Authenticated HTTP gateway for Gremlin servers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP gateway.
    Serve {
        #[command(flatten)]
        args: GatewayArgs,
    },

    /// Submit a single query to a Gremlin server.
    Query {
        /// Gremlin server `host:port`, or a full ws:// / wss:// URL.
        #[arg(long, default_value = "127.0.0.1:8182")]
        endpoint: String,

        /// Username for the Gremlin server.
        #[arg(short = 'u', long)]
        username: Option<String>,

        /// Password for the Gremlin server.
        #[arg(short = 'p', long)]
        password: Option<String>,

        /// Query text.
        #[arg(short = 'q', long, conflicts_with = "file")]
        query: Option<String>,

        /// File holding the query text.
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,

        /// Request timeout in milliseconds.
        #[arg(long, default_value_t = 60_000)]
        timeout: u64,

        /// Print at most this many results (0 prints all).
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Accept any TLS certificate.
        #[arg(long)]
        skip_cert_verify: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    let result = match cli.command {
        Command::Serve { args } => runtime.block_on(serve(args)),
        Command::Query {
            endpoint,
            username,
            password,
            query,
            file,
            timeout,
            limit,
            skip_cert_verify,
        } => runtime.block_on(run_query(QueryOptions {
            endpoint,
            credentials: username.map(|u| Credentials::new(u, password.unwrap_or_default())),
            query,
            file,
            timeout: Duration::from_millis(timeout),
            limit,
            skip_cert_verify,
        })),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn serve(args: GatewayArgs) -> anyhow::Result<()> {
    let config = Arc::new(GatewayConfig::from_args(args));

    let log_format: LogFormat = config.log_format.parse()?;
    let telemetry = Telemetry::init(
        TelemetryConfig::new(DEFAULT_SERVICE_NAME)
            .with_log_level(config.log_level())
            .with_log_format(log_format),
    )
    .context("failed to initialize logging")?;

    log_startup!(
        service = telemetry.service_name(),
        version = env!("CARGO_PKG_VERSION"),
        gremlin_server = %config.engine.url,
        gremlin_auth = config.auth.gremlin_auth,
        "starting gateway"
    );

    gremlin_gateway::server::run(config).await
}

struct QueryOptions {
    endpoint: String,
    credentials: Option<Credentials>,
    query: Option<String>,
    file: Option<PathBuf>,
    timeout: Duration,
    limit: usize,
    skip_cert_verify: bool,
}

async fn run_query(options: QueryOptions) -> anyhow::Result<()> {
    let query = match (options.query, options.file) {
        (Some(query), _) => query,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read query file {}", path.display()))?,
        (None, None) => bail!("either --query or --file is required"),
    };

    let url = if options.endpoint.contains("://") {
        options.endpoint.clone()
    } else {
        endpoint_url(None, &options.endpoint, "/gremlin")
    };

    let args = GatewayArgs {
        gremlin_url: Some(url),
        skip_cert_verify: options.skip_cert_verify,
        request_timeout_secs: options.timeout.as_secs().max(1),
        ..query_defaults()
    };
    let gateway = QueryGateway::new(Arc::new(GatewayConfig::from_args(args)));

    let started = Instant::now();
    let result = gateway
        .submit(options.credentials.as_ref(), &query)
        .await
        .map_err(|e: GatewayError| anyhow::anyhow!(translate(&e).message))?;
    println!("Elapsed: {:?}", started.elapsed());
    println!("Type: {}, results: {}", result.r#type, result.len());

    let shown = if options.limit == 0 {
        result.len()
    } else {
        options.limit.min(result.len())
    };
    for value in result.value.iter().take(shown) {
        println!("{}", value.get());
    }
    if shown < result.len() {
        println!("... {} more", result.len() - shown);
    }
    Ok(())
}

/// Serve defaults, used as the base for one-shot queries.
fn query_defaults() -> GatewayArgs {
    #[derive(Parser)]
    struct Defaults {
        #[command(flatten)]
        args: GatewayArgs,
    }
    Defaults::parse_from(["gremlin-gateway"]).args
}
