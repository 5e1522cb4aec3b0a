use crate::core::model::{JobId, JobKind, JobOutcome, ProgressSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Started { job_id: JobId, kind: JobKind },
    Progress { job_id: JobId, snapshot: ProgressSnapshot },
    Finished { job_id: JobId, outcome: JobOutcome },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Started { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Finished { job_id, .. } => *job_id,
        }
    }
}
