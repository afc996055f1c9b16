use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::{Display, Formatter};

pub const DATABASE_URL_ENV: &str = "WAYPOINT_DATABASE_URL";
pub const REDIS_URL_ENV: &str = "WAYPOINT_REDIS_URL";
pub const ADMISSION_ENV: &str = "WAYPOINT_ADMISSION";
pub const LOG_FORMAT_ENV: &str = "WAYPOINT_LOG_FORMAT";
pub const BASE_URL_ENV: &str = "WAYPOINT_BASE_URL";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdmissionArg {
    #[value(name = "local")]
    Local,
    #[value(name = "distributed")]
    Distributed,
}

impl Display for AdmissionArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AdmissionArg::Local => write!(f, "local"),
            AdmissionArg::Distributed => write!(f, "distributed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "waypoint", about = "Create and resolve short links")]
pub struct Cli {
    /// Postgres URL of the durable tier. Links are kept in memory when unset.
    #[arg(long, env = DATABASE_URL_ENV, global = true)]
    pub database_url: Option<String>,

    /// Redis URL of the cache tier. An in-process cache is used when unset.
    #[arg(long, env = REDIS_URL_ENV, global = true)]
    pub redis_url: Option<String>,

    #[arg(
        long,
        env = ADMISSION_ENV,
        value_enum,
        default_value_t = AdmissionArg::Local,
        global = true
    )]
    pub admission: AdmissionArg,

    /// Per-call timeout for store operations, in milliseconds.
    #[arg(long, default_value_t = 2_000, global = true)]
    pub store_timeout_ms: u64,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub limits: LimitArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Numeric parameters of the admission controllers.
#[derive(Debug, Clone, clap::Args)]
pub struct LimitArgs {
    /// Global token refill rate per second (local admission).
    #[arg(long, default_value_t = 100.0, global = true)]
    pub global_rate: f64,
    #[arg(long, default_value_t = 200, global = true)]
    pub global_burst: u32,
    /// Per-origin token refill rate per second (local admission).
    #[arg(long, default_value_t = 5.0, global = true)]
    pub origin_rate: f64,
    #[arg(long, default_value_t = 10, global = true)]
    pub origin_burst: u32,
    /// Seconds before an idle origin bucket is dropped (local admission).
    #[arg(long, default_value_t = 180, global = true)]
    pub origin_idle_secs: u64,
    /// Requests per second across all origins (distributed admission).
    #[arg(long, default_value_t = 100, global = true)]
    pub global_limit: u64,
    /// Requests per second from one origin (distributed admission).
    #[arg(long, default_value_t = 10, global = true)]
    pub origin_limit: u64,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten a URL.
    Shorten {
        url: String,
        /// Owner id. Anonymous links are temporary.
        #[arg(long, default_value = "")]
        owner: String,
        /// Origin key used for admission, usually the client address.
        #[arg(long, default_value = "127.0.0.1")]
        origin: String,
        #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
        base_url: String,
        /// Print the link as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the destination of a short code.
    Resolve {
        code: String,
        #[arg(long)]
        json: bool,
    },
    /// Delete permanent links older than a given age.
    Prune {
        #[arg(long, default_value_t = 30 * 24 * 60 * 60)]
        max_age_secs: u64,
        #[arg(long, default_value_t = 60 * 60)]
        interval_secs: u64,
        /// Run a single pass and exit.
        #[arg(long)]
        once: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_shorten_with_owner() {
        let cli = Cli::try_parse_from([
            "waypoint",
            "--admission",
            "distributed",
            "shorten",
            "https://example.com",
            "--owner",
            "u1",
        ])
        .unwrap();

        assert_eq!(cli.admission, AdmissionArg::Distributed);
        match cli.command {
            Command::Shorten { url, owner, .. } => {
                assert_eq!(url, "https://example.com");
                assert_eq!(owner, "u1");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn prune_defaults() {
        let cli = Cli::try_parse_from(["waypoint", "prune", "--once"]).unwrap();
        match cli.command {
            Command::Prune {
                max_age_secs,
                once,
                ..
            } => {
                assert_eq!(max_age_secs, 30 * 24 * 60 * 60);
                assert!(once);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
