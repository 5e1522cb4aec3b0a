use crate::plugins::registry::{AppConfig, CliPlugin};
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;
use url::Url;

pub struct RemoteCliPlugin;

impl RemoteCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for RemoteCliPlugin {
    fn name(&self) -> &'static str {
        "backend"
    }

    fn augment_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("backend_url")
                .long("backend-url")
                .help_heading("Backend")
                .help("Base URL of the processing backend")
                .default_value("http://127.0.0.1:5000")
                .global(true)
                .num_args(1),
        )
        .arg(
            Arg::new("backend_user_agent")
                .long("user-agent")
                .help_heading("Backend")
                .help("User-Agent sent to the backend")
                .default_value("wap-jobs/0.1")
                .global(true)
                .num_args(1),
        )
        .arg(
            Arg::new("poll_interval_ms")
                .long("poll-interval-ms")
                .help_heading("Backend")
                .help("Delay between progress polls")
                .default_value("1000")
                .global(true)
                .num_args(1),
        )
        .arg(
            Arg::new("submit_timeout_ms")
                .long("submit-timeout-ms")
                .help_heading("Backend")
                .help("Override every job kind's submission timeout")
                .global(true)
                .num_args(1),
        )
        .arg(
            Arg::new("fetch_timeout_ms")
                .long("fetch-timeout-ms")
                .help_heading("Backend")
                .help("Upper bound for a single progress poll")
                .default_value("5000")
                .global(true)
                .num_args(1),
        )
    }

    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut AppConfig) -> anyhow::Result<()> {
        if let Some(s) = matches.get_one::<String>("backend_url") {
            cfg.backend.base_url = Url::parse(s)?;
        }
        if let Some(ua) = matches.get_one::<String>("backend_user_agent") {
            cfg.backend.user_agent = ua.clone();
        }
        if let Some(s) = matches.get_one::<String>("poll_interval_ms") {
            let ms: u64 = s.parse()?;
            if ms == 0 {
                anyhow::bail!("poll interval must be positive");
            }
            cfg.coordinator.poll_interval = Duration::from_millis(ms);
        }
        if let Some(s) = matches.get_one::<String>("submit_timeout_ms") {
            cfg.backend.submit_timeout = Some(Duration::from_millis(s.parse()?));
        }
        if let Some(s) = matches.get_one::<String>("fetch_timeout_ms") {
            cfg.coordinator.fetch_timeout = Duration::from_millis(s.parse()?);
        }
        Ok(())
    }
}
