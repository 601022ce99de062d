// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task snapshot journal. The full `TaskState` is stored as JSON; status,
//! user, and provider are duplicated into columns for filtering.

use chrono::Utc;
use railsnipe_core::{RailsnipeError, TaskError, TaskId, TaskState, TaskStatus};
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// Error recorded on tasks a previous process left unfinished.
pub const INTERRUPTED_MESSAGE: &str = "interrupted by restart";

fn encode(state: &TaskState) -> Result<String, RailsnipeError> {
    serde_json::to_string(state).map_err(RailsnipeError::storage)
}

/// Insert or replace the snapshot for `state.task_id`.
pub async fn upsert_task(db: &Database, state: &TaskState) -> Result<(), RailsnipeError> {
    let payload = encode(state)?;
    let task_id = state.task_id.0.clone();
    let user = state.user.0.clone();
    let provider = state.provider.to_string();
    let status = state.status.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO task_states (task_id, user_ref, provider, status, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(task_id) DO UPDATE SET
                    status = excluded.status,
                    payload = excluded.payload,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![task_id, user, provider, status, payload],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_task(db: &Database, task_id: &TaskId) -> Result<Option<TaskState>, RailsnipeError> {
    let task_id = task_id.0.clone();
    let payload = db
        .connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            let result = conn.query_row(
                "SELECT payload FROM task_states WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            );
            match result {
                Ok(payload) => Ok(Some(payload)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)?;

    payload
        .map(|p| serde_json::from_str(&p).map_err(RailsnipeError::storage))
        .transpose()
}

/// Mark every PENDING or RUNNING snapshot as FAILED. Returns how many changed.
pub async fn mark_interrupted(db: &Database) -> Result<u64, RailsnipeError> {
    let pending = TaskStatus::Pending.to_string();
    let running = TaskStatus::Running.to_string();
    let rows = db
        .connection()
        .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
            let mut stmt =
                conn.prepare("SELECT payload FROM task_states WHERE status IN (?1, ?2)")?;
            let rows = stmt.query_map(params![pending, running], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)?;

    let now = Utc::now();
    let mut updated = 0;
    for payload in rows {
        let mut state: TaskState = match serde_json::from_str(&payload) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable task snapshot");
                continue;
            }
        };
        state.status = TaskStatus::Failed;
        state.finished_at = Some(now);
        state.last_error = Some(TaskError::internal(INTERRUPTED_MESSAGE));
        upsert_task(db, &state).await?;
        updated += 1;
    }
    Ok(updated)
}
