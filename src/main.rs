mod core;
mod i18n;
mod plugins;

use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use crate::core::coordinator::JobCoordinator;
use crate::core::events::JobEvent;
use crate::core::model::*;
use crate::i18n::{describe, get_messages, Locale, Messages};
use crate::plugins::local::reorganizer::Reorganizer;
use crate::plugins::registry::{AppConfig, PluginRegistry};
use crate::plugins::remote::client::BackendClient;

fn required(id: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(id).long(long).help(help).required(true).num_args(1)
}

fn build_cli(registry: &PluginRegistry) -> Command {
    let batch = |name: &'static str, about: &'static str| {
        Command::new(name)
            .about(about)
            .arg(required("source", "source", "Folder with scanned images"))
            .arg(
                Arg::new("dest")
                    .long("dest")
                    .help("Output folder")
                    .default_value("results")
                    .num_args(1),
            )
    };

    let run = Command::new("run")
        .about("Run a backend job and follow its progress")
        .subcommand_required(true)
        .subcommand(batch("rename", "Rename images after the QR code they carry"))
        .subcommand(batch("rotate", "Rotate images upright using the QR code position"))
        .subcommand(
            batch("process", "Rename and optionally rotate in one pass").arg(
                Arg::new("rotate")
                    .long("rotate")
                    .help("Also rotate images upright")
                    .action(ArgAction::SetTrue),
            ),
        )
        .subcommand(
            Command::new("convert-dpi")
                .about("Resample images to a target DPI")
                .arg(required("source_dir", "source-dir", "Folder with images"))
                .arg(required("dest_dir", "dest-dir", "Output folder"))
                .arg(
                    Arg::new("target_dpi")
                        .long("target-dpi")
                        .help("Target DPI")
                        .default_value("200")
                        .num_args(1),
                ),
        )
        .subcommand(
            Command::new("world-files")
                .about("Create world files for georeferenced map images")
                .arg(required("source_dir", "source-dir", "Folder with map images"))
                .arg(required("polygon_path", "polygons", "Polygon layer")),
        )
        .subcommand(
            Command::new("off-point")
                .about("Report points lying outside their polygon")
                .arg(required("point_path", "points", "Point layer"))
                .arg(required("polygon_path", "polygons", "Polygon layer"))
                .arg(
                    Arg::new("level")
                        .long("level")
                        .help("Area level: Desa or SLS")
                        .default_value("Desa")
                        .num_args(1),
                ),
        )
        .subcommand(
            Command::new("sipw-evaluate")
                .about("Evaluate SiPW polygon overlaps")
                .arg(required("polygon_path", "polygons", "Polygon layer"))
                .arg(required("reference_path", "reference", "Reference layer")),
        )
        .subcommand(
            Command::new("sipw-report")
                .about("Write the SiPW evaluation report")
                .arg(required("polygon_path", "polygons", "Polygon layer"))
                .arg(required("output_path", "output", "Report file")),
        );

    let reorganize = Command::new("reorganize")
        .about("Sort ID-named files into <group>/<subgroup> folders")
        .arg(Arg::new("dir").help("Folder to reorganize").required(true).num_args(1))
        .arg(
            Arg::new("recursive")
                .long("recursive")
                .short('r')
                .help("Include files in subfolders")
                .action(ArgAction::SetTrue),
        );

    let app = Command::new("wap-jobs")
        .about("Start, follow and cancel long-running WAP jobs")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("locale")
                .long("locale")
                .help("Message language: en or id")
                .default_value("en")
                .global(true)
                .num_args(1),
        )
        .arg(
            Arg::new("deadline_secs")
                .long("deadline-secs")
                .help("Override the job's deadline")
                .global(true)
                .num_args(1),
        )
        .subcommand(Command::new("health").about("Check that the backend is reachable"))
        .subcommand(Command::new("shutdown").about("Ask the backend process to exit"))
        .subcommand(run)
        .subcommand(reorganize);

    registry.augment_command(app)
}

fn apply_app_matches(m: &ArgMatches, cfg: &mut AppConfig) -> anyhow::Result<()> {
    if let Some(s) = m.get_one::<String>("locale") {
        cfg.locale = Locale::parse(s);
    }
    if let Some(s) = m.get_one::<String>("deadline_secs") {
        let secs: u64 = s.parse().context("--deadline-secs")?;
        cfg.coordinator.deadline_override = Some(Duration::from_secs(secs));
    }
    Ok(())
}

fn path(m: &ArgMatches, id: &str) -> anyhow::Result<PathBuf> {
    m.get_one::<String>(id)
        .map(PathBuf::from)
        .with_context(|| format!("missing {id}"))
}

fn request_from(name: &str, m: &ArgMatches) -> anyhow::Result<JobRequest> {
    let request = match name {
        "rename" => JobRequest::Rename(BatchParams { source: path(m, "source")?, dest: path(m, "dest")? }),
        "rotate" => JobRequest::Rotate(BatchParams { source: path(m, "source")?, dest: path(m, "dest")? }),
        "process" => JobRequest::Process(ProcessParams {
            source: path(m, "source")?,
            dest: path(m, "dest")?,
            rotate: m.get_flag("rotate"),
        }),
        "convert-dpi" => JobRequest::ConvertDpi(DpiParams {
            source_dir: path(m, "source_dir")?,
            dest_dir: path(m, "dest_dir")?,
            target_dpi: match m.get_one::<String>("target_dpi") {
                Some(s) => s.parse().context("--target-dpi")?,
                None => DpiParams::DEFAULT_DPI,
            },
        }),
        "world-files" => JobRequest::CreateWorldFiles(WorldFileParams {
            source_dir: path(m, "source_dir")?,
            polygon_path: path(m, "polygon_path")?,
        }),
        "off-point" => {
            let level = m.get_one::<String>("level").map(String::as_str).unwrap_or("Desa");
            JobRequest::CheckOffPoint(OffPointParams {
                point_path: path(m, "point_path")?,
                polygon_path: path(m, "polygon_path")?,
                level: AreaLevel::parse(level).with_context(|| format!("unknown level: {level}"))?,
            })
        }
        "sipw-evaluate" => JobRequest::EvaluateSipw(SipwEvaluateParams {
            polygon_path: path(m, "polygon_path")?,
            reference_path: path(m, "reference_path")?,
        }),
        "sipw-report" => JobRequest::SipwReport(SipwReportParams {
            polygon_path: path(m, "polygon_path")?,
            output_path: path(m, "output_path")?,
        }),
        "reorganize" => JobRequest::Reorganize(ReorganizeParams {
            source: path(m, "dir")?,
            recursive: m.get_flag("recursive"),
        }),
        other => anyhow::bail!("unknown job: {other}"),
    };
    Ok(request)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,wap_jobs=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let registry = PluginRegistry::with_defaults();
    let matches = build_cli(&registry).get_matches();
    let (name, sub) = matches.subcommand().context("missing command")?;
    // global flags are read where they land: on the innermost subcommand
    let (leaf_name, leaf) = sub.subcommand().unwrap_or((name, sub));

    let mut cfg = AppConfig::default();
    registry.apply_matches(leaf, &mut cfg)?;
    apply_app_matches(leaf, &mut cfg)?;
    let msgs = get_messages(cfg.locale);
    let backend = BackendClient::new(&cfg.backend)?;

    match name {
        "health" => match backend.health().await {
            Ok(h) => println!("{} ({}): {} {}", msgs.backend_healthy, backend.base_url(), h.status, h.message),
            Err(e) => anyhow::bail!("{} ({}): {}", msgs.backend_unreachable, backend.base_url(), e),
        },
        "shutdown" => {
            backend
                .shutdown()
                .await
                .with_context(|| msgs.backend_unreachable.to_string())?;
            println!("{}", msgs.shutdown_sent);
        }
        _ => {
            let request = request_from(leaf_name, leaf)?;
            run_job(backend, &cfg, request, msgs).await?;
        }
    }

    Ok(())
}

async fn run_job(backend: BackendClient, cfg: &AppConfig, request: JobRequest, msgs: &'static Messages) -> anyhow::Result<()> {
    let reorganizer = Arc::new(Reorganizer::new());
    let coordinator = JobCoordinator::new(backend, reorganizer, cfg.coordinator.clone());
    let ui_task = tokio::spawn(render(coordinator.subscribe(), coordinator.id(), msgs));

    if let Err(e) = coordinator.start(request).await {
        ui_task.abort();
        anyhow::bail!("{}: {}", msgs.not_started, e);
    }

    let outcome = tokio::select! {
        outcome = coordinator.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{}", msgs.cancelling);
            coordinator.cancel();
            coordinator.wait().await
        }
    };
    let _ = ui_task.await;

    let line = describe(&outcome, msgs);
    if !outcome.is_success() {
        anyhow::bail!(line);
    }
    println!("{line}");
    if let Some(stats) = outcome.report().reorganize_stats() {
        for note in stats.skipped.iter().chain(&stats.errors) {
            println!("  {}: {}", note.name, note.reason);
        }
    }
    Ok(())
}

async fn render(mut rx: broadcast::Receiver<JobEvent>, job_id: JobId, msgs: &'static Messages) {
    let sty_spinner = ProgressStyle::with_template("{spinner:.green} {prefix} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("|/-\\ ");
    let sty_bar = ProgressStyle::with_template("{prefix} {bar:40.cyan/blue} {pos}/{len} (eta {eta}) {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());

    let pb = ProgressBar::new_spinner();
    pb.set_style(sty_spinner.clone());
    pb.enable_steady_tick(Duration::from_millis(120));

    loop {
        let evt = match rx.recv().await {
            Ok(e) => e,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(_) => break,
        };
        if evt.job_id() != job_id {
            continue;
        }

        match evt {
            JobEvent::Started { kind, .. } => {
                pb.set_prefix(format!("[{kind}]"));
                pb.set_message(msgs.job_started);
            }
            JobEvent::Progress { snapshot, .. } => {
                match snapshot.total {
                    Some(total) if !snapshot.is_indeterminate() => {
                        if pb.length() != Some(total) {
                            pb.set_style(sty_bar.clone());
                            pb.set_length(total);
                        }
                        pb.set_position(snapshot.current.unwrap_or(0).min(total));
                    }
                    _ => pb.set_style(sty_spinner.clone()),
                }
                pb.set_message(snapshot.message);
            }
            JobEvent::Finished { outcome, .. } => {
                pb.finish_with_message(outcome.label());
                break;
            }
        }
    }
}
