pub mod config;
pub mod project;
pub mod serve;
pub mod template;

use anyhow::Context as _;
use devhub_core::config::Config;
use devhub_core::memory::InMemoryGateway;
use devhub_core::{RemoteGateway, Workspace};
use devhub_remote::RestGateway;
use std::path::PathBuf;
use std::sync::Arc;

/// Global options shared by every subcommand.
pub struct Context {
    pub config_path: PathBuf,
    pub json: bool,
    pub memory: bool,
}

impl Context {
    pub fn load_config(&self) -> anyhow::Result<Config> {
        Config::load(&self.config_path)
            .with_context(|| format!("failed to load {}", self.config_path.display()))
    }

    /// Workspace for the configured user, backed by the remote store or, with
    /// `--memory`, by a fresh in-process one.
    pub fn workspace(&self, config: &Config) -> anyhow::Result<Arc<Workspace>> {
        let gateway: Arc<dyn RemoteGateway> = if self.memory {
            Arc::new(InMemoryGateway::new())
        } else {
            let rest = RestGateway::from_config(&config.remote).with_context(|| {
                format!(
                    "cannot reach the remote store; set remote.url in {} or pass --memory",
                    self.config_path.display()
                )
            })?;
            Arc::new(rest)
        };
        Ok(Arc::new(Workspace::new(
            config.user_id(),
            gateway,
            config.reconciler_options(),
        )))
    }
}
