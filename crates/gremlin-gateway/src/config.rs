//! Gateway configuration.
//!
//! Every setting is a command-line flag with an environment fallback. The
//! parsed arguments are folded into a [`GatewayConfig`] once at startup and
//! shared read-only behind an `Arc`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::protocol::RequestOptions;

/// Development signing key. Startup warns when it is still in use.
pub const DEFAULT_JWT_SECRET: &str = "gremlin-gateway-development-secret";

/// Query used by the engine health check.
pub const HEALTHCHECK_QUERY: &str = "g.V().id().limit(10)";

/// Command-line and environment settings for `serve`.
#[derive(Args, Debug, Clone)]
pub struct GatewayArgs {
    /// HTTP listen port.
    #[arg(long, env = "PORT", default_value_t = 8081)]
    pub port: u16,

    /// Log at debug level.
    #[arg(long, env = "DEBUG")]
    pub debug: bool,

    /// Log output format (json or pretty).
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Directory holding the built web UI.
    #[arg(long, env = "STATIC_DIR", default_value = "./html/build")]
    pub static_dir: PathBuf,

    /// Authenticate callers against the Gremlin server instead of the admin account.
    #[arg(long = "gremlin-auth", env = "USE_GREMLIN_AUTH")]
    pub gremlin_auth: bool,

    /// Admin username when Gremlin authentication is off.
    #[arg(long, env = "GATEWAY_USERNAME", default_value = "admin")]
    pub admin_username: String,

    /// Admin password when Gremlin authentication is off.
    #[arg(long, env = "GATEWAY_PASSWORD", default_value = "admin", hide_env_values = true)]
    pub admin_password: String,

    /// Secret used to sign session tokens and encrypt passwords inside them.
    #[arg(long, env = "JWT_SECRET_KEY", default_value = DEFAULT_JWT_SECRET, hide_env_values = true)]
    pub jwt_secret: String,

    /// Session lifetime in seconds.
    #[arg(long, env = "JWT_TIMEOUT_SECS", default_value_t = 86_400)]
    pub jwt_timeout_secs: u64,

    /// How long after login a session may still be refreshed, in seconds.
    #[arg(long, env = "JWT_MAX_REFRESH_SECS", default_value_t = 86_400)]
    pub jwt_max_refresh_secs: u64,

    /// Gremlin server `host:port`.
    #[arg(long, env = "GREMLINSERVER_HOST", default_value = "127.0.0.1:8182")]
    pub gremlin_host: String,

    /// Gremlin server WebSocket path.
    #[arg(long, env = "GREMLINSERVER_PATH", default_value = "/gremlin")]
    pub gremlin_path: String,

    /// Full Gremlin server URL; overrides host and path.
    #[arg(long, env = "GREMLINSERVER_URL")]
    pub gremlin_url: Option<String>,

    /// Traversal source aliases as `name:graph`, comma separated.
    #[arg(
        long,
        env = "GREMLINSERVER_ALIASES",
        value_delimiter = ',',
        value_parser = parse_alias
    )]
    pub gremlin_aliases: Vec<(String, String)>,

    /// Accept any TLS certificate from the Gremlin server.
    #[arg(long, env = "GREMLINSERVER_SKIPCERTVERIFY")]
    pub skip_cert_verify: bool,

    /// Per-request deadline for Gremlin round trips, in seconds. 0 disables it.
    #[arg(long, env = "GREMLINSERVER_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Server-side evaluation timeout forwarded with each query, in milliseconds.
    #[arg(long, env = "GREMLINSERVER_EVALUATIONTIMEOUT")]
    pub evaluation_timeout_ms: Option<u64>,

    /// Ids per property lookup batch.
    #[arg(long, env = "PREFETCH_BATCHSIZE", default_value_t = 100)]
    pub batch_size: usize,

    /// Maximum batches per property lookup.
    #[arg(long, env = "PREFETCH_BATCHCOUNT", default_value_t = 10)]
    pub batch_count: usize,

    /// Text shown as a watermark by the UI.
    #[arg(long, env = "WATERMARK", default_value = "")]
    pub watermark: String,
}

fn parse_alias(raw: &str) -> Result<(String, String), String> {
    let (name, graph) = raw
        .trim()
        .split_once(':')
        .ok_or_else(|| format!("alias '{}' is not of the form name:graph", raw))?;
    let (name, graph) = (name.trim(), graph.trim());
    if name.is_empty() || graph.is_empty() {
        return Err(format!("alias '{}' has an empty side", raw));
    }
    Ok((name.to_string(), graph.to_string()))
}

/// Session and login settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub gremlin_auth: bool,
    pub admin_username: String,
    pub admin_password: String,
    pub jwt_secret: String,
    pub jwt_timeout_secs: u64,
    pub jwt_max_refresh_secs: u64,
}

impl AuthConfig {
    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }

    /// Whether a session first issued at `orig_iat` may still be refreshed at `now`.
    pub fn refresh_allowed(&self, orig_iat: i64, now: i64) -> bool {
        let window = i64::try_from(self.jwt_max_refresh_secs).unwrap_or(i64::MAX);
        orig_iat.saturating_add(window) >= now
    }
}

/// Where and how to reach the Gremlin server.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub url: String,
    pub skip_cert_verify: bool,
    pub aliases: BTreeMap<String, String>,
    pub request_timeout: Option<Duration>,
    pub evaluation_timeout_ms: Option<u64>,
}

impl EngineConfig {
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            aliases: self.aliases.clone(),
            evaluation_timeout_ms: self.evaluation_timeout_ms,
        }
    }
}

/// Property prefetch limits.
#[derive(Debug, Clone, Copy)]
pub struct PrefetchConfig {
    pub batch_size: usize,
    pub batch_count: usize,
}

impl PrefetchConfig {
    /// Largest id list a single lookup may carry.
    pub fn page_size(&self) -> usize {
        self.batch_size.saturating_mul(self.batch_count)
    }
}

/// Complete, immutable gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub debug: bool,
    pub log_format: String,
    pub static_dir: PathBuf,
    pub auth: AuthConfig,
    pub engine: EngineConfig,
    pub prefetch: PrefetchConfig,
    pub watermark: String,
}

impl GatewayConfig {
    pub fn from_args(args: GatewayArgs) -> Self {
        let url = endpoint_url(
            args.gremlin_url.as_deref(),
            &args.gremlin_host,
            &args.gremlin_path,
        );
        let request_timeout =
            (args.request_timeout_secs > 0).then(|| Duration::from_secs(args.request_timeout_secs));

        Self {
            port: args.port,
            debug: args.debug,
            log_format: args.log_format,
            static_dir: args.static_dir,
            auth: AuthConfig {
                gremlin_auth: args.gremlin_auth,
                admin_username: args.admin_username,
                admin_password: args.admin_password,
                jwt_secret: args.jwt_secret,
                jwt_timeout_secs: args.jwt_timeout_secs,
                jwt_max_refresh_secs: args.jwt_max_refresh_secs,
            },
            engine: EngineConfig {
                url,
                skip_cert_verify: args.skip_cert_verify,
                aliases: args.gremlin_aliases.into_iter().collect(),
                request_timeout,
                evaluation_timeout_ms: args.evaluation_timeout_ms,
            },
            prefetch: PrefetchConfig {
                batch_size: args.batch_size.max(1),
                batch_count: args.batch_count.max(1),
            },
            watermark: args.watermark,
        }
    }

    /// Log level implied by `--debug`.
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

/// The explicit URL when given, otherwise `ws://{host}{path}`.
pub fn endpoint_url(url: Option<&str>, host: &str, path: &str) -> String {
    match url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => url.to_string(),
        None if path.starts_with('/') || path.is_empty() => format!("ws://{}{}", host, path),
        None => format!("ws://{}/{}", host, path),
    }
}
