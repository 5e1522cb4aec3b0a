use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Rename,
    Rotate,
    Process,
    DpiConvert,
    WorldFileCreate,
    OffPointCheck,
    SipwEvaluate,
    SipwReport,
    Reorganize,
}

impl JobKind {
    #[cfg(test)]
    pub const ALL: [JobKind; 9] = [
        JobKind::Rename,
        JobKind::Rotate,
        JobKind::Process,
        JobKind::DpiConvert,
        JobKind::WorldFileCreate,
        JobKind::OffPointCheck,
        JobKind::SipwEvaluate,
        JobKind::SipwReport,
        JobKind::Reorganize,
    ];

    pub fn name(self) -> &'static str {
        match self {
            JobKind::Rename => "rename",
            JobKind::Rotate => "rotate",
            JobKind::Process => "process",
            JobKind::DpiConvert => "dpi-convert",
            JobKind::WorldFileCreate => "world-file-create",
            JobKind::OffPointCheck => "off-point-check",
            JobKind::SipwEvaluate => "sipw-evaluate",
            JobKind::SipwReport => "sipw-report",
            JobKind::Reorganize => "reorganize",
        }
    }

    /// Backend route that starts this kind. `None` for work done in-process.
    pub fn endpoint(self) -> Option<&'static str> {
        match self {
            JobKind::Rename => Some("/batch_rename"),
            JobKind::Rotate => Some("/batch_rotate"),
            JobKind::Process => Some("/batch_process"),
            JobKind::DpiConvert => Some("/convert_dpi"),
            JobKind::WorldFileCreate => Some("/create_world_files"),
            JobKind::OffPointCheck => Some("/search_off_point"),
            JobKind::SipwEvaluate => Some("/evaluate_sipw"),
            JobKind::SipwReport => Some("/generate_sipw_report"),
            JobKind::Reorganize => None,
        }
    }

    pub fn is_local(self) -> bool {
        self.endpoint().is_none()
    }

    /// Remote kinds that acknowledge immediately and report through `/progress`.
    /// The off-point check answers with its final result instead.
    pub fn is_polled(self) -> bool {
        !self.is_local() && self != JobKind::OffPointCheck
    }

    pub fn submit_timeout(self) -> Duration {
        match self {
            JobKind::OffPointCheck => Duration::from_secs(120),
            _ => Duration::from_secs(10),
        }
    }

    /// Client-side wall clock budget, measured from the moment the job starts running.
    pub fn deadline(self) -> Duration {
        let minutes = match self {
            JobKind::DpiConvert | JobKind::WorldFileCreate | JobKind::Reorganize => 15,
            JobKind::Rename | JobKind::Rotate | JobKind::Process => 10,
            JobKind::SipwEvaluate => 5,
            JobKind::SipwReport => 3,
            JobKind::OffPointCheck => return self.submit_timeout(),
        };
        Duration::from_secs(minutes * 60)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchParams {
    pub source: PathBuf,
    pub dest: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessParams {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub rotate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DpiParams {
    pub source_dir: PathBuf,
    pub dest_dir: PathBuf,
    pub target_dpi: u32,
}

impl DpiParams {
    pub const DEFAULT_DPI: u32 = 200;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum AreaLevel {
    #[default]
    Desa,
    #[serde(rename = "SLS")]
    Sls,
}

impl AreaLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "desa" => Some(Self::Desa),
            "sls" => Some(Self::Sls),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OffPointParams {
    pub point_path: PathBuf,
    pub polygon_path: PathBuf,
    pub level: AreaLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldFileParams {
    pub source_dir: PathBuf,
    pub polygon_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SipwEvaluateParams {
    pub polygon_path: PathBuf,
    pub reference_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SipwReportParams {
    pub polygon_path: PathBuf,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorganizeParams {
    pub source: PathBuf,
    pub recursive: bool,
}

/// A typed request: the kind is implied by the parameter record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRequest {
    Rename(BatchParams),
    Rotate(BatchParams),
    Process(ProcessParams),
    ConvertDpi(DpiParams),
    CreateWorldFiles(WorldFileParams),
    CheckOffPoint(OffPointParams),
    EvaluateSipw(SipwEvaluateParams),
    SipwReport(SipwReportParams),
    Reorganize(ReorganizeParams),
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::Rename(_) => JobKind::Rename,
            JobRequest::Rotate(_) => JobKind::Rotate,
            JobRequest::Process(_) => JobKind::Process,
            JobRequest::ConvertDpi(_) => JobKind::DpiConvert,
            JobRequest::CreateWorldFiles(_) => JobKind::WorldFileCreate,
            JobRequest::CheckOffPoint(_) => JobKind::OffPointCheck,
            JobRequest::EvaluateSipw(_) => JobKind::SipwEvaluate,
            JobRequest::SipwReport(_) => JobKind::SipwReport,
            JobRequest::Reorganize(_) => JobKind::Reorganize,
        }
    }

    /// JSON body posted to the backend. `None` for in-process kinds.
    pub fn body(&self) -> Result<Option<serde_json::Value>, serde_json::Error> {
        let value = match self {
            JobRequest::Rename(p) | JobRequest::Rotate(p) => serde_json::to_value(p)?,
            JobRequest::Process(p) => serde_json::to_value(p)?,
            JobRequest::ConvertDpi(p) => serde_json::to_value(p)?,
            JobRequest::CreateWorldFiles(p) => serde_json::to_value(p)?,
            JobRequest::CheckOffPoint(p) => serde_json::to_value(p)?,
            JobRequest::EvaluateSipw(p) => serde_json::to_value(p)?,
            JobRequest::SipwReport(p) => serde_json::to_value(p)?,
            JobRequest::Reorganize(_) => return Ok(None),
        };
        Ok(Some(value))
    }
}

/// One file the reorganizer did not move, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileNote {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorganizeStats {
    pub processed_files: u64,
    pub moved_files: u64,
    pub skipped_files: u64,
    pub failed_files: u64,
    pub unique_groups: u64,
    pub unique_subgroups: u64,
    pub skipped: Vec<FileNote>,
    pub errors: Vec<FileNote>,
}

/// Operation specific statistics attached to a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobStats {
    Reorganize(ReorganizeStats),
    Backend(serde_json::Value),
}

/// One reported progress state of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub current: Option<u64>,
    pub total: Option<u64>,
    pub message: String,
    pub is_running: Option<bool>,
    pub error: Option<String>,
    pub result: Option<JobStats>,
}

/// Where a snapshot leaves its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Pending,
    Succeeded,
    Failed(String),
}

impl ProgressSnapshot {
    pub fn running(current: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            current: Some(current),
            total: Some(total),
            message: message.into(),
            is_running: Some(true),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            message: error.clone(),
            is_running: Some(false),
            error: Some(error),
            ..Default::default()
        }
    }

    /// The single completion rule shared by every job kind.
    ///
    /// A non-empty `error` always wins. Otherwise either an explicit
    /// `is_running == false` or `current >= total` (with a known, non-zero
    /// total) means success.
    pub fn completion(&self) -> Completion {
        if let Some(error) = self.error.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            return Completion::Failed(error.to_string());
        }
        if self.is_running == Some(false) {
            return Completion::Succeeded;
        }
        match (self.current, self.total) {
            (Some(current), Some(total)) if total > 0 && current >= total => Completion::Succeeded,
            _ => Completion::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.completion() != Completion::Pending
    }

    pub fn is_indeterminate(&self) -> bool {
        matches!(self.total, None | Some(0))
    }
}

/// Last known counts and statistics of a job, kept so partial results
/// survive failure, timeout and cancellation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobReport {
    pub current: Option<u64>,
    pub total: Option<u64>,
    pub message: String,
    pub stats: Option<JobStats>,
}

impl JobReport {
    pub fn from_stats(stats: JobStats) -> Self {
        Self { stats: Some(stats), ..Default::default() }
    }

    pub fn absorb(&mut self, snapshot: &ProgressSnapshot) {
        if snapshot.current.is_some() {
            self.current = snapshot.current;
        }
        if snapshot.total.is_some() {
            self.total = snapshot.total;
        }
        if !snapshot.message.is_empty() {
            self.message = snapshot.message.clone();
        }
        if let Some(result) = &snapshot.result {
            self.stats = Some(result.clone());
        }
    }

    pub fn reorganize_stats(&self) -> Option<&ReorganizeStats> {
        match &self.stats {
            Some(JobStats::Reorganize(stats)) => Some(stats),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded(JobReport),
    Failed { reason: String, report: JobReport },
    TimedOut(JobReport),
    Cancelled(JobReport),
}

impl JobOutcome {
    pub fn report(&self) -> &JobReport {
        match self {
            JobOutcome::Succeeded(report)
            | JobOutcome::TimedOut(report)
            | JobOutcome::Cancelled(report)
            | JobOutcome::Failed { report, .. } => report,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded(_) => "succeeded",
            JobOutcome::Failed { .. } => "failed",
            JobOutcome::TimedOut(_) => "timed-out",
            JobOutcome::Cancelled(_) => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Idle,
    Running,
    Finished(JobOutcome),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished(_))
    }

    pub fn outcome(&self) -> Option<&JobOutcome> {
        match self {
            JobState::Finished(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Idle -> Running -> Finished, plus Idle -> Finished for a rejected
    /// submission. Finished is absorbing.
    pub fn admits(&self, next: &JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Idle, JobState::Running)
                | (JobState::Idle, JobState::Finished(_))
                | (JobState::Running, JobState::Finished(_))
        )
    }
}
