mod admin;
mod config;
mod footer;
mod hooks;
mod options;
mod resolve;
mod roles;
mod server;
mod session;
mod store;

use crate::admin::{AnalyticsActionLinks, AnalyticsSettingsPanel, PAGE_SLUG};
use crate::config::AppConfig;
use crate::footer::{EmitPolicy, FooterEmitter};
use crate::hooks::{AdminPage, HookRegistry};
use crate::options::{OptionSanitizer, Sanitizer};
use crate::roles::{RoleTable, StaticRoleTable};
use crate::server::AppState;
use crate::session::MemorySessionManager;
use crate::store::{FsStore, MemoryStore, SettingsStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = AppConfig::load()?;

    let roles: Arc<dyn RoleTable> = match &config.roles_file {
        Some(path) => Arc::new(StaticRoleTable::from_file(path)?),
        None => Arc::new(StaticRoleTable::builtin()),
    };

    let store: Arc<dyn SettingsStore> = match &config.state_path {
        Some(path) => Arc::new(FsStore::new(path.clone())),
        None => {
            tracing::info!("no state path configured; settings are kept in memory");
            Arc::new(MemoryStore::default())
        }
    };

    let sessions = Arc::new(MemorySessionManager::default());
    let sanitizer: Arc<dyn Sanitizer> = Arc::new(OptionSanitizer::new(roles.clone()));

    let policy = if config.enforce_opt_outs {
        EmitPolicy::Enforce
    } else {
        EmitPolicy::Annotate
    };

    let mut hooks = HookRegistry::default();
    hooks.register_footer(Arc::new(FooterEmitter::new(
        store.clone(),
        roles.clone(),
        policy,
    )));
    hooks.register_admin_page(AdminPage {
        slug: PAGE_SLUG.to_string(),
        title: "Google Analytics".to_string(),
        menu_label: "Google Analytics".to_string(),
        panel: Arc::new(AnalyticsSettingsPanel::new(
            store.clone(),
            roles.clone(),
            sanitizer,
        )),
    });
    hooks.register_action_links(Arc::new(AnalyticsActionLinks));

    let state = AppState::new(config.clone(), store, roles, sessions, Arc::new(hooks));

    let addr: SocketAddr = config.bind_addr;
    tracing::info!(%addr, site_root = %config.site_root.display(), "starting tagfoot server");
    server::run(addr, state).await?;
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
