//! MySQL state repository

use super::store::StateStore;
use super::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use tracing::{debug, info, warn};

/// Lock row id (the table holds exactly one row)
const REFRESH_STATUS_ID: i32 = 1;

/// MySQL-backed [`StateStore`]
#[derive(Clone)]
pub struct StateRepository {
    pool: MySqlPool,
}

impl StateRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn ensure_refresh_row(&self) -> crate::Result<()> {
        sqlx::query("INSERT IGNORE INTO refresh_status (id, is_running) VALUES (?, 0)")
            .bind(REFRESH_STATUS_ID)
            .execute(&self.pool)
            .await
            .map_err(|e| crate::Error::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for StateRepository {
    // ========================================
    // multiviewers / state_mv / state_windows
    // ========================================

    async fn ensure_multiviewer(&self, nexx_index: u32) -> crate::Result<Multiviewer> {
        // Existing rows keep their operator-assigned label
        let result = sqlx::query(
            r#"
            INSERT IGNORE INTO multiviewers (nexx_index, label, enabled)
            VALUES (?, ?, 1)
            "#,
        )
        .bind(nexx_index)
        .bind(Multiviewer::default_label(nexx_index))
        .execute(&self.pool)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        if result.rows_affected() > 0 {
            info!(nexx_index = nexx_index, "Created multiviewer");
        }

        self.get_multiviewer_by_index(nexx_index)
            .await?
            .ok_or_else(|| {
                crate::Error::Database(format!("Multiviewer {} vanished after insert", nexx_index))
            })
    }

    async fn get_multiviewer_by_index(
        &self,
        nexx_index: u32,
    ) -> crate::Result<Option<Multiviewer>> {
        let row = sqlx::query_as::<_, MultiviewerRow>(
            r#"
            SELECT id, nexx_index, label, enabled
            FROM multiviewers
            WHERE nexx_index = ?
            "#,
        )
        .bind(nexx_index)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_multiviewers(&self) -> crate::Result<Vec<Multiviewer>> {
        let rows = sqlx::query_as::<_, MultiviewerRow>(
            r#"
            SELECT id, nexx_index, label, enabled
            FROM multiviewers
            ORDER BY nexx_index ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn upsert_mv_settings(&self, mv_id: i64, settings: &MvSettings) -> crate::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO state_mv
                (mv_id, layout, font, outer_border, inner_border, output_format)
            VALUES (?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                layout = VALUES(layout),
                font = VALUES(font),
                outer_border = VALUES(outer_border),
                inner_border = VALUES(inner_border),
                output_format = VALUES(output_format),
                updated_at = NOW(3)
            "#,
        )
        .bind(mv_id)
        .bind(settings.layout)
        .bind(settings.font)
        .bind(settings.outer_border)
        .bind(settings.inner_border)
        .bind(settings.output_format)
        .execute(&self.pool)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        debug!(mv_id = mv_id, "Upserted MV settings");
        Ok(())
    }

    async fn get_mv_settings(&self, mv_id: i64) -> crate::Result<Option<MvSettings>> {
        let row = sqlx::query_as::<_, MvSettingsRow>(
            r#"
            SELECT layout, font, outer_border, inner_border, output_format
            FROM state_mv
            WHERE mv_id = ?
            "#,
        )
        .bind(mv_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        Ok(row.map(|r| r.into()))
    }

    async fn upsert_window_state(&self, mv_id: i64, state: &WindowState) -> crate::Result<()> {
        let umd_json = serde_json::to_value(&state.umd)?;

        sqlx::query(
            r#"
            INSERT INTO state_windows (mv_id, window_index, pcm_bars, umd_json)
            VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                pcm_bars = VALUES(pcm_bars),
                umd_json = VALUES(umd_json),
                updated_at = NOW(3)
            "#,
        )
        .bind(mv_id)
        .bind(state.window_index)
        .bind(state.pcm_bars)
        .bind(umd_json)
        .execute(&self.pool)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_window_state(
        &self,
        mv_id: i64,
        window_index: u32,
    ) -> crate::Result<Option<WindowState>> {
        let row = sqlx::query_as::<_, WindowRow>(
            r#"
            SELECT window_index, pcm_bars, umd_json
            FROM state_windows
            WHERE mv_id = ? AND window_index = ?
            "#,
        )
        .bind(mv_id)
        .bind(window_index)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        Ok(row.map(|r| r.into()))
    }

    // ========================================
    // sources / state_routing
    // ========================================

    async fn upsert_source(&self, entry: &SourceEntry) -> crate::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sources (quartz_input, label)
            VALUES (?, ?)
            ON DUPLICATE KEY UPDATE
                label = VALUES(label),
                updated_at = NOW(3)
            "#,
        )
        .bind(entry.input)
        .bind(&entry.label)
        .execute(&self.pool)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn upsert_routing(
        &self,
        output: u32,
        input: Option<u32>,
        at: DateTime<Utc>,
    ) -> crate::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO state_routing (quartz_output, quartz_input, updated_at)
            VALUES (?, ?, ?)
            ON DUPLICATE KEY UPDATE
                quartz_input = VALUES(quartz_input),
                updated_at = VALUES(updated_at)
            "#,
        )
        .bind(output)
        .bind(input)
        .bind(at.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_routing(&self, output: u32) -> crate::Result<Option<RoutingEntry>> {
        let row = sqlx::query_as::<_, RoutingRow>(
            r#"
            SELECT quartz_output, quartz_input, updated_at
            FROM state_routing
            WHERE quartz_output = ?
            "#,
        )
        .bind(output)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        Ok(row.map(|r| r.into()))
    }

    // ========================================
    // refresh_status
    // ========================================

    async fn load_refresh_status(&self) -> crate::Result<RefreshStatus> {
        let row = sqlx::query_as::<_, RefreshStatusRow>(
            r#"
            SELECT is_running, started_at, started_by, finished_at, result_json
            FROM refresh_status
            WHERE id = ?
            "#,
        )
        .bind(REFRESH_STATUS_ID)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        Ok(row.map(Into::into).unwrap_or_default())
    }

    async fn try_begin_refresh(&self, claim: &RefreshClaim) -> crate::Result<ClaimDecision> {
        self.ensure_refresh_row().await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| crate::Error::Database(e.to_string()))?;

        let row = sqlx::query_as::<_, RefreshStatusRow>(
            r#"
            SELECT is_running, started_at, started_by, finished_at, result_json
            FROM refresh_status
            WHERE id = ?
            FOR UPDATE
            "#,
        )
        .bind(REFRESH_STATUS_ID)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        let current: RefreshStatus = row.into();
        // Dropping the transaction on rejection rolls back and releases the row lock
        let decision = current.check_claim(claim)?;

        sqlx::query(
            r#"
            UPDATE refresh_status
            SET is_running = 1, started_at = ?, started_by = ?
            WHERE id = ?
            "#,
        )
        .bind(claim.started_at.naive_utc())
        .bind(&claim.started_by)
        .bind(REFRESH_STATUS_ID)
        .execute(&mut *tx)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| crate::Error::Database(e.to_string()))?;

        if decision == ClaimDecision::TakeOverStale {
            warn!(
                previous_holder = ?current.started_by,
                previous_start = ?current.started_at,
                "Took over stale refresh lock"
            );
        }

        Ok(decision)
    }

    async fn finish_refresh(
        &self,
        finished_at: DateTime<Utc>,
        result: &RefreshResult,
    ) -> crate::Result<()> {
        let result_json = serde_json::to_value(result)?;

        sqlx::query(
            r#"
            UPDATE refresh_status
            SET is_running = 0, finished_at = ?, result_json = ?
            WHERE id = ?
            "#,
        )
        .bind(finished_at.naive_utc())
        .bind(result_json)
        .bind(REFRESH_STATUS_ID)
        .execute(&self.pool)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        Ok(())
    }
}

// ============================================================
// Row Types (sqlx)
// ============================================================

fn utc(naive: chrono::NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
}

#[derive(sqlx::FromRow)]
struct MultiviewerRow {
    id: i64,
    nexx_index: u32,
    label: String,
    enabled: bool,
}

impl From<MultiviewerRow> for Multiviewer {
    fn from(row: MultiviewerRow) -> Self {
        Self {
            id: row.id,
            nexx_index: row.nexx_index,
            label: row.label,
            enabled: row.enabled,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MvSettingsRow {
    layout: i64,
    font: i64,
    outer_border: i64,
    inner_border: i64,
    output_format: i64,
}

impl From<MvSettingsRow> for MvSettings {
    fn from(row: MvSettingsRow) -> Self {
        Self {
            layout: row.layout,
            font: row.font,
            outer_border: row.outer_border,
            inner_border: row.inner_border,
            output_format: row.output_format,
        }
    }
}

#[derive(sqlx::FromRow)]
struct WindowRow {
    window_index: u32,
    pcm_bars: i64,
    umd_json: Option<serde_json::Value>,
}

impl From<WindowRow> for WindowState {
    fn from(row: WindowRow) -> Self {
        let umd = row
            .umd_json
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        Self {
            window_index: row.window_index,
            pcm_bars: row.pcm_bars,
            umd,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RoutingRow {
    quartz_output: u32,
    quartz_input: Option<u32>,
    updated_at: chrono::NaiveDateTime,
}

impl From<RoutingRow> for RoutingEntry {
    fn from(row: RoutingRow) -> Self {
        Self {
            output: row.quartz_output,
            input: row.quartz_input,
            updated_at: utc(row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct RefreshStatusRow {
    is_running: bool,
    started_at: Option<chrono::NaiveDateTime>,
    started_by: Option<String>,
    finished_at: Option<chrono::NaiveDateTime>,
    result_json: Option<serde_json::Value>,
}

impl From<RefreshStatusRow> for RefreshStatus {
    fn from(row: RefreshStatusRow) -> Self {
        Self {
            is_running: row.is_running,
            started_at: row.started_at.map(utc),
            started_by: row.started_by,
            finished_at: row.finished_at.map(utc),
            result: row.result_json.and_then(|v| serde_json::from_value(v).ok()),
        }
    }
}
