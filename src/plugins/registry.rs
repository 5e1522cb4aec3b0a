use clap::{ArgMatches, Command};

use crate::core::coordinator::CoordinatorConfig;
use crate::i18n::Locale;
use crate::plugins::remote::client::BackendConfig;

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub coordinator: CoordinatorConfig,
    pub locale: Locale,
}

/// Contributes global flags to the command line and reads them back into
/// [`AppConfig`].
pub trait CliPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn augment_command(&self, cmd: Command) -> Command;
    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut AppConfig) -> anyhow::Result<()>;
}

pub struct PluginRegistry {
    cli_plugins: Vec<Box<dyn CliPlugin>>,
}

impl PluginRegistry {
    pub fn with_defaults() -> Self {
        let mut reg = Self { cli_plugins: vec![] };
        reg.cli_plugins.push(Box::new(crate::plugins::remote::cli::RemoteCliPlugin::new()));
        reg.cli_plugins.push(Box::new(crate::plugins::local::cli::LocalCliPlugin::new()));
        reg
    }

    pub fn augment_command(&self, cmd: Command) -> Command {
        self.cli_plugins
            .iter()
            .fold(cmd, |c, p| p.augment_command(c))
    }

    pub fn apply_matches(&self, matches: &ArgMatches, cfg: &mut AppConfig) -> anyhow::Result<()> {
        for p in &self.cli_plugins {
            p.apply_matches(matches, cfg)
                .map_err(|e| e.context(format!("{} options", p.name())))?;
        }
        Ok(())
    }
}
