//! The job lifecycle transitions of the data model, as pure functions over
//! a `Job` (and, where assignment/release is involved, its paired `Engine`).
//!
//! Every function here either mutates in place and returns `Ok(())`, or
//! returns an `AppError::Validation` and leaves both records untouched —
//! rejected transitions never have partial effects.

use chrono::Utc;

use crate::error::{AppError, AppResult};
use crate::model::{Engine, Job, JobStatus};

pub fn validate_submission(
    source_url: &str,
    target_codec: &str,
    job_size: Option<f64>,
    max_retries: Option<i64>,
    priority: Option<i64>,
) -> AppResult<()> {
    if source_url.trim().is_empty() {
        return Err(AppError::validation("source_url must be a non-empty string"));
    }
    if target_codec.trim().is_empty() {
        return Err(AppError::validation("target_codec must be a non-empty string"));
    }
    if let Some(size) = job_size {
        if size < 0.0 {
            return Err(AppError::validation("job_size must be a non-negative number"));
        }
    }
    if let Some(retries) = max_retries {
        if retries < 0 {
            return Err(AppError::validation("max_retries must be a non-negative integer"));
        }
    }
    if let Some(p) = priority {
        if crate::model::Priority::from_i16(p).is_none() {
            return Err(AppError::validation("priority must be 0, 1, or 2"));
        }
    }
    Ok(())
}

/// `pending -> assigned`. Couples the job and its engine atomically.
pub fn assign(job: &mut Job, engine: &mut Engine) -> AppResult<()> {
    if job.status != JobStatus::Pending {
        return Err(AppError::validation(format!(
            "cannot assign job in status {:?}",
            job.status
        )));
    }
    job.status = JobStatus::Assigned;
    job.assigned_engine = Some(engine.engine_id.clone());
    job.touch();
    engine.claim(job.job_id);
    Ok(())
}

/// `assigned -> completed`.
pub fn complete(job: &mut Job, engine: Option<&mut Engine>, output_url: String) -> AppResult<()> {
    if job.status.is_terminal() {
        return Err(AppError::validation("job is already in a terminal state"));
    }
    if job.status != JobStatus::Assigned {
        return Err(AppError::validation(format!(
            "cannot complete job in status {:?}",
            job.status
        )));
    }
    if output_url.is_empty() || !(output_url.starts_with("http://") || output_url.starts_with("https://")) {
        return Err(AppError::validation(
            "output_url must be a non-empty string starting with http:// or https://",
        ));
    }
    job.status = JobStatus::Completed;
    job.output_url = Some(output_url);
    job.assigned_engine = None;
    job.touch();
    if let Some(engine) = engine {
        engine.release();
    }
    Ok(())
}

/// Outcome of a `fail` transition, so callers (handlers, the reaper) can
/// react to which branch was taken without re-deriving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Requeued,
    PermanentlyFailed,
}

/// `assigned | pending -> pending | failed_permanently`.
///
/// Compares the *current* `retries` against `max_retries` before touching
/// either: a job already at its cap goes permanent without a further
/// increment, otherwise `retries` is incremented and the job is requeued.
pub fn fail(job: &mut Job, engine: Option<&mut Engine>, error_message: String) -> AppResult<FailOutcome> {
    if job.status.is_terminal() {
        return Err(AppError::validation("job is already in a terminal state"));
    }
    if error_message.is_empty() {
        return Err(AppError::validation("error_message must be present"));
    }
    job.error_message = Some(error_message);
    job.assigned_engine = None;
    job.touch();
    if let Some(engine) = engine {
        engine.release();
    }

    let outcome = if job.retries >= job.max_retries {
        job.status = JobStatus::FailedPermanently;
        FailOutcome::PermanentlyFailed
    } else {
        job.retries += 1;
        job.status = JobStatus::Pending;
        FailOutcome::Requeued
    };
    Ok(outcome)
}

/// `non-terminal -> cancelled`. Does not touch `retries` — cancellation is
/// not a failure attempt (see Open Question 1 in SPEC_FULL.md §9).
pub fn cancel(job: &mut Job, engine: Option<&mut Engine>) -> AppResult<()> {
    if job.status.is_terminal() {
        return Err(AppError::validation("job is already in a terminal state"));
    }
    job.status = JobStatus::Cancelled;
    job.assigned_engine = None;
    job.touch();
    if let Some(engine) = engine {
        engine.release();
    }
    Ok(())
}

/// `failed | failed_permanently -> pending`, administrator-initiated.
pub fn retry(job: &mut Job) -> AppResult<()> {
    if !matches!(job.status, JobStatus::Failed | JobStatus::FailedPermanently) {
        return Err(AppError::validation(format!(
            "cannot retry job in status {:?}",
            job.status
        )));
    }
    job.status = JobStatus::Pending;
    job.assigned_engine = None;
    job.retries = 0;
    job.output_url = None;
    job.error_message = None;
    job.touch();
    Ok(())
}

/// `pending -> expired`, reaper-initiated (age > max_age).
pub fn expire(job: &mut Job) -> AppResult<()> {
    if job.status != JobStatus::Pending {
        return Err(AppError::validation(format!(
            "cannot expire job in status {:?}",
            job.status
        )));
    }
    job.status = JobStatus::Expired;
    job.touch();
    Ok(())
}

/// Patches whitelisted admin-settable fields: `priority`, `max_retries`,
/// `resource_requirements`. Any other field in `patch` is ignored.
pub fn apply_patch(job: &mut Job, patch: &JobPatch) -> AppResult<()> {
    if let Some(priority) = patch.priority {
        let priority = crate::model::Priority::from_i16(priority)
            .ok_or_else(|| AppError::validation("priority must be 0, 1, or 2"))?;
        job.priority = priority;
    }
    if let Some(max_retries) = patch.max_retries {
        if max_retries < 0 {
            return Err(AppError::validation("max_retries must be a non-negative integer"));
        }
        job.max_retries = max_retries;
    }
    if let Some(resource_requirements) = patch.resource_requirements.clone() {
        job.resource_requirements = Some(resource_requirements);
    }
    job.touch();
    Ok(())
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct JobPatch {
    pub priority: Option<i64>,
    pub max_retries: Option<i64>,
    pub resource_requirements: Option<serde_json::Value>,
}

pub fn update_progress(job: &mut Job, progress: i64, _message: Option<String>) -> AppResult<()> {
    if !(0..=100).contains(&progress) {
        return Err(AppError::validation("progress must be between 0 and 100"));
    }
    job.progress = Some(progress);
    job.touch();
    Ok(())
}

pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}
