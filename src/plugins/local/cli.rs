use crate::plugins::registry::{AppConfig, CliPlugin};
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub struct LocalCliPlugin;

impl LocalCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for LocalCliPlugin {
    fn name(&self) -> &'static str {
        "reorganizer"
    }

    fn augment_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("yield_ms")
                .long("yield-ms")
                .help_heading("Reorganizer")
                .help("Pause between files while reorganizing")
                .default_value("5")
                .global(true)
                .num_args(1),
        )
    }

    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut AppConfig) -> anyhow::Result<()> {
        if let Some(s) = matches.get_one::<String>("yield_ms") {
            cfg.coordinator.yield_between_files = Duration::from_millis(s.parse()?);
        }
        Ok(())
    }
}
