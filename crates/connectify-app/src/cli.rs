use clap::Parser;

/// Connectify presence client: publishes this terminal's activity and
/// answers status queries for other users.
#[derive(Parser, Debug)]
#[command(name = "connectify", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<String>,

    /// Log filter directive override (e.g. `debug`, `connectify_presence=trace`).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Socket endpoint override.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Session token. Without one the client stays signed out until `login`.
    #[arg(long, env = "CONNECTIFY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Presence channel override.
    #[arg(long)]
    pub channel: Option<String>,
}

pub fn parse() -> Args {
    Args::parse()
}
