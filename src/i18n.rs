/// Localized user-visible text for wap-jobs.
/// Locale is selected via the `--locale` CLI flag (e.g. `--locale id`).
use crate::core::model::{JobOutcome, JobReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Id,
}

impl Locale {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "id" | "id-id" | "id_id" | "in" => Self::Id,
            _ => Self::En,
        }
    }
}

pub struct Messages {
    pub job_started: &'static str,
    pub succeeded: &'static str,
    pub failed: &'static str,
    pub timed_out: &'static str,
    pub cancelled: &'static str,
    pub not_started: &'static str,
    pub last_progress: &'static str,
    pub moved: &'static str,
    pub skipped: &'static str,
    pub file_errors: &'static str,
    pub groups: &'static str,
    pub backend_healthy: &'static str,
    pub backend_unreachable: &'static str,
    pub shutdown_sent: &'static str,
    pub cancelling: &'static str,
}

pub static EN: Messages = Messages {
    job_started: "Job started",
    succeeded: "Completed",
    failed: "Failed",
    timed_out: "Timed out; the backend may still be working",
    cancelled: "Cancelled",
    not_started: "Could not start job",
    last_progress: "last progress",
    moved: "moved",
    skipped: "skipped",
    file_errors: "errors",
    groups: "groups",
    backend_healthy: "Backend is reachable",
    backend_unreachable: "Backend is not reachable",
    shutdown_sent: "Backend asked to shut down",
    cancelling: "Cancelling...",
};

pub static ID: Messages = Messages {
    job_started: "Proses dimulai",
    succeeded: "Selesai",
    failed: "Gagal",
    timed_out: "Waktu habis; backend mungkin masih bekerja",
    cancelled: "Dibatalkan",
    not_started: "Proses tidak dapat dimulai",
    last_progress: "progres terakhir",
    moved: "dipindahkan",
    skipped: "dilewati",
    file_errors: "galat",
    groups: "grup",
    backend_healthy: "Backend dapat dihubungi",
    backend_unreachable: "Backend tidak dapat dihubungi",
    shutdown_sent: "Backend diminta berhenti",
    cancelling: "Membatalkan...",
};

pub fn get_messages(locale: Locale) -> &'static Messages {
    match locale {
        Locale::En => &EN,
        Locale::Id => &ID,
    }
}

/// One line describing a finished job, partial counts included.
pub fn describe(outcome: &JobOutcome, m: &Messages) -> String {
    let head = match outcome {
        JobOutcome::Succeeded(_) => m.succeeded.to_string(),
        JobOutcome::Failed { reason, .. } => format!("{}: {}", m.failed, reason),
        JobOutcome::TimedOut(_) => m.timed_out.to_string(),
        JobOutcome::Cancelled(_) => m.cancelled.to_string(),
    };
    match detail(outcome.report(), m) {
        Some(detail) => format!("{head} ({detail})"),
        None => head,
    }
}

fn detail(report: &JobReport, m: &Messages) -> Option<String> {
    if let Some(stats) = report.reorganize_stats() {
        return Some(format!(
            "{} {}, {} {}, {} {}, {} {}",
            m.moved,
            stats.moved_files,
            m.skipped,
            stats.skipped_files,
            m.file_errors,
            stats.failed_files,
            m.groups,
            stats.unique_groups
        ));
    }
    match (report.current, report.total) {
        (Some(current), Some(total)) if total > 0 => Some(format!("{} {}/{}", m.last_progress, current, total)),
        _ if !report.message.is_empty() => Some(report.message.clone()),
        _ => None,
    }
}
