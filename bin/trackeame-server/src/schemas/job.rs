use serde::{Deserialize, Serialize};
use trackeame_core::store::{JobRecord, JobStatus};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct JobListQuery {
    /// `queued`, `running`, `completed` or `failed`; defaults to `failed`.
    pub status: Option<String>,
    /// 1..=500, default 50.
    pub limit: Option<u32>,
}

impl JobListQuery {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(50).clamp(1, 500)
    }

    /// `None` for an unrecognised status.
    pub fn status(&self) -> Option<JobStatus> {
        match self.status.as_deref() {
            None => Some(JobStatus::Failed),
            Some(raw) => raw.parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobResponse {
    pub id: String,
    pub job_key: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub error_msg: Option<String>,
    pub available_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<JobRecord> for JobResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            payload: serde_json::from_str(&job.payload).unwrap_or(serde_json::Value::String(job.payload)),
            id: job.id,
            job_key: job.job_key,
            name: job.name,
            status: job.status.to_string(),
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            error_msg: job.error_msg,
            available_at: job.available_at.to_rfc3339(),
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}
