use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Row};

use crate::db::{
    helpers::{parse_datetime, parse_status, status_columns, to_i64, to_u64},
    models::UploadRecord,
    Database,
};
use crate::models::{Sample, SampleMetadata};
use crate::upload::UploadStatus;

fn row_to_record(row: &Row) -> Result<UploadRecord> {
    let status: String = row.get("upload_status")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(UploadRecord {
        sample_id: row.get("id")?,
        session_id: row.get("session_id")?,
        action_label: row.get("action_label")?,
        performer_id: row.get("performer_id")?,
        frame_count: to_u64(row.get("frame_count")?, "frame_count")?,
        status: parse_status(&status, row.get("remote_id")?, row.get("failure_reason")?)?,
        attempts: to_u64(row.get("attempts")?, "attempts")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

fn row_to_sample(row: &Row) -> Result<Sample> {
    let frames: String = row.get("frames_json")?;
    let metrics: String = row.get("metrics_json")?;
    let created_at: String = row.get("created_at")?;

    Ok(Sample {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        metadata: SampleMetadata {
            action_label: row.get("action_label")?,
            performer_id: row.get("performer_id")?,
            dialect: row.get("dialect")?,
        },
        frames: serde_json::from_str(&frames).context("corrupt frames_json")?,
        metrics: serde_json::from_str(&metrics).context("corrupt metrics_json")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    /// Stores a finished sample, queued for upload.
    pub async fn insert_sample(&self, sample: &Sample) -> Result<()> {
        let record = sample.clone();
        self.execute(move |conn| {
            let frames = serde_json::to_string(&record.frames)?;
            let metrics = serde_json::to_string(&record.metrics)?;
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO samples (id, session_id, action_label, performer_id, dialect,
                     frame_count, frames_json, metrics_json, upload_status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id,
                    record.session_id,
                    record.metadata.action_label,
                    record.metadata.performer_id,
                    record.metadata.dialect,
                    to_i64(record.frame_count() as u64)?,
                    frames,
                    metrics,
                    UploadStatus::Queued.as_str(),
                    record.created_at.to_rfc3339(),
                    now,
                ],
            )
            .with_context(|| format!("failed to insert sample {}", record.id))?;
            Ok(())
        })
        .await
    }

    /// Records a status transition. Entering `InFlight` counts an attempt.
    pub async fn update_upload_status(&self, sample_id: &str, status: &UploadStatus) -> Result<()> {
        let sample_id = sample_id.to_string();
        let status = status.clone();
        self.execute(move |conn| {
            let (name, remote_id, reason) = status_columns(&status);
            let attempt = i64::from(status == UploadStatus::InFlight);
            conn.execute(
                "UPDATE samples
                 SET upload_status = ?1,
                     remote_id = ?2,
                     failure_reason = ?3,
                     attempts = attempts + ?4,
                     updated_at = ?5
                 WHERE id = ?6",
                params![
                    name,
                    remote_id,
                    reason,
                    attempt,
                    Utc::now().to_rfc3339(),
                    sample_id,
                ],
            )
            .with_context(|| format!("failed to update upload status of {sample_id}"))?;
            Ok(())
        })
        .await
    }

    pub async fn list_uploads(&self) -> Result<Vec<UploadRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, action_label, performer_id, frame_count, upload_status,
                        remote_id, failure_reason, attempts, created_at, updated_at
                 FROM samples
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(records)
        })
        .await
    }

    /// Items a crash left mid-upload go back to the queue. Returns how many.
    pub async fn requeue_interrupted_uploads(&self) -> Result<usize> {
        self.execute(|conn| {
            let changed = conn
                .execute(
                    "UPDATE samples SET upload_status = 'queued', updated_at = ?1
                     WHERE upload_status = 'in_flight'",
                    params![Utc::now().to_rfc3339()],
                )
                .context("failed to requeue interrupted uploads")?;
            Ok(changed)
        })
        .await
    }

    /// Samples not yet delivered, oldest first, with their current status.
    pub async fn pending_samples(&self) -> Result<Vec<(Sample, UploadStatus)>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, action_label, performer_id, dialect, frames_json,
                        metrics_json, upload_status, remote_id, failure_reason, created_at
                 FROM samples
                 WHERE upload_status IN ('queued', 'failed')
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut pending = Vec::new();
            while let Some(row) = rows.next()? {
                let status: String = row.get("upload_status")?;
                let status =
                    parse_status(&status, row.get("remote_id")?, row.get("failure_reason")?)?;
                pending.push((row_to_sample(row)?, status));
            }
            Ok(pending)
        })
        .await
    }

    pub async fn get_sample(&self, sample_id: &str) -> Result<Option<Sample>> {
        let sample_id = sample_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, action_label, performer_id, dialect, frames_json,
                        metrics_json, created_at
                 FROM samples WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![sample_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_sample(row)?)),
                None => Ok(None),
            }
        })
        .await
    }
}
