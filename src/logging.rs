//! Tracing setup for the binary and for embedders that want ours.
//!
//! `RUST_LOG` wins when set. Otherwise the wallet logs at `info` and the TLS
//! and HTTP stacks underneath are held at `warn`.

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info,rustls=warn,tokio_rustls=warn,hyper=warn,hyper_util=warn,reqwest=warn";
const VERBOSE_FILTER: &str = "info,pouch=debug,rustls=warn,tokio_rustls=warn,hyper=warn,hyper_util=warn,reqwest=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Some(LogFormat::Compact),
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }

    /// `POUCH_LOG_FORMAT`, or `POUCH_LOG_JSON=1` as a shorthand for json.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(format) = lookup("POUCH_LOG_FORMAT").as_deref().and_then(LogFormat::parse) {
            return format;
        }
        match lookup("POUCH_LOG_JSON").as_deref() {
            Some("1") | Some("true") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Install the global subscriber on stderr. Safe to call more than once.
pub fn init_logging() {
    init_with(LogFormat::from_lookup(|key| std::env::var(key).ok()), false);
}

/// Same as [`init_logging`] but with wallet internals at `debug`.
pub fn init_verbose_logging() {
    init_with(LogFormat::from_lookup(|key| std::env::var(key).ok()), true);
}

fn init_with(format: LogFormat, verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose));
    let builder = fmt::Subscriber::builder().with_env_filter(env_filter).with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
}

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER })
}
