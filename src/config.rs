use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Runtime configuration, environment-first with CLI overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Root directory of the served HTML site.
    pub site_root: PathBuf,
    /// JSON settings state file; unset means the in-memory store.
    pub state_path: Option<PathBuf>,
    /// TOML role table; unset means the built-in roles.
    pub roles_file: Option<PathBuf>,
    /// When set, role and admin-area opt-outs suppress the snippet instead
    /// of only annotating it.
    pub enforce_opt_outs: bool,
    pub enable_cors: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "tagfoot",
    about = "Serves a static site with a Google Analytics footer snippet and an admin settings surface"
)]
pub struct Cli {
    /// Address to listen on (overrides BIND_ADDR).
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Site content root (overrides SITE_ROOT).
    #[arg(long)]
    pub site_root: Option<PathBuf>,
    /// Settings state file (overrides STATE_PATH).
    #[arg(long)]
    pub state_path: Option<PathBuf>,
    /// Role table file (overrides ROLES_FILE).
    #[arg(long)]
    pub roles_file: Option<PathBuf>,
    /// Make opt-outs actually suppress the snippet.
    #[arg(long)]
    pub enforce_opt_outs: bool,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self::from_env()?.with_cli(Cli::parse()))
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr: SocketAddr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("failed to parse BIND_ADDR")?;

        let site_root =
            PathBuf::from(std::env::var("SITE_ROOT").unwrap_or_else(|_| "site".to_string()));
        let state_path = std::env::var("STATE_PATH").ok().map(PathBuf::from);
        let roles_file = std::env::var("ROLES_FILE").ok().map(PathBuf::from);

        let enforce_opt_outs = env_flag("ENFORCE_OPT_OUTS");
        let enable_cors = env_flag("ENABLE_CORS");

        Ok(Self {
            bind_addr,
            site_root,
            state_path,
            roles_file,
            enforce_opt_outs,
            enable_cors,
        })
    }

    pub fn with_cli(mut self, cli: Cli) -> Self {
        if let Some(bind) = cli.bind {
            self.bind_addr = bind;
        }
        if let Some(site_root) = cli.site_root {
            self.site_root = site_root;
        }
        if let Some(state_path) = cli.state_path {
            self.state_path = Some(state_path);
        }
        if let Some(roles_file) = cli.roles_file {
            self.roles_file = Some(roles_file);
        }
        if cli.enforce_opt_outs {
            self.enforce_opt_outs = true;
        }
        self
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
