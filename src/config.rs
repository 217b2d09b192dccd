use clap::Parser;
use std::path::PathBuf;

/// Command line and environment configuration of the dashboard server.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "dashboard", about = "Interactive Play Store analytics dashboard", version)]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, env = "DASHBOARD_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, env = "DASHBOARD_PORT", default_value_t = 8501)]
    pub port: u16,

    /// Play Store CSV export to load at startup.
    #[arg(long, env = "DASHBOARD_DATASET", default_value = "playstore-analysis.csv")]
    pub dataset: PathBuf,

    /// Directory served under /static.
    #[arg(long, env = "DASHBOARD_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Most browser sessions kept at once; the least recently used is
    /// dropped beyond this.
    #[arg(long, env = "DASHBOARD_MAX_SESSIONS", default_value_t = 1000)]
    pub max_sessions: usize,

    /// Seconds without a request after which a session is dropped.
    #[arg(long, env = "DASHBOARD_SESSION_IDLE_SECS", default_value_t = 1800)]
    pub session_idle_secs: u64,

    /// Increase output logging verbosity.
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Log level used when `RUST_LOG` is not set.
    pub fn default_log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8501,
            dataset: PathBuf::from("playstore-analysis.csv"),
            static_dir: PathBuf::from("static"),
            max_sessions: 1000,
            session_idle_secs: 1800,
            verbose: false,
        }
    }
}
