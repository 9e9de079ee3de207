//! Integration repository

use super::types::*;
use crate::nexx_client::JwtCredentials;
use sqlx::MySqlPool;
use tracing::info;

/// Integration Repository
#[derive(Clone)]
pub struct IntegrationRepository {
    pool: MySqlPool,
}

impl IntegrationRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, protocol: Protocol) -> crate::Result<Option<Integration>> {
        let row = sqlx::query_as::<_, IntegrationRow>(
            r#"
            SELECT id, protocol, host, port, api_key, jwt_credentials, max_inputs, max_outputs
            FROM integrations
            WHERE protocol = ?
            "#,
        )
        .bind(protocol.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        row.map(Integration::try_from).transpose()
    }

    pub async fn list(&self) -> crate::Result<Vec<Integration>> {
        let rows = sqlx::query_as::<_, IntegrationRow>(
            r#"
            SELECT id, protocol, host, port, api_key, jwt_credentials, max_inputs, max_outputs
            FROM integrations
            ORDER BY protocol ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        rows.into_iter().map(Integration::try_from).collect()
    }

    /// Insert or replace the integration for `req.protocol`. Stored JWT
    /// credentials are kept unless new ones are supplied.
    pub async fn upsert(&self, req: &IntegrationUpsert) -> crate::Result<Integration> {
        let credentials = req
            .jwt_credentials()
            .map(|c| serde_json::to_value(&c))
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO integrations
                (protocol, host, port, api_key, jwt_credentials, max_inputs, max_outputs)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                host = VALUES(host),
                port = VALUES(port),
                api_key = VALUES(api_key),
                jwt_credentials = COALESCE(VALUES(jwt_credentials), jwt_credentials),
                max_inputs = VALUES(max_inputs),
                max_outputs = VALUES(max_outputs),
                updated_at = NOW(3)
            "#,
        )
        .bind(req.protocol.as_str())
        .bind(&req.host)
        .bind(req.port)
        .bind(&req.api_key)
        .bind(credentials)
        .bind(req.max_inputs)
        .bind(req.max_outputs)
        .execute(&self.pool)
        .await
        .map_err(|e| crate::Error::Database(e.to_string()))?;

        info!(protocol = %req.protocol, host = %req.host, "Saved integration");

        self.get(req.protocol)
            .await?
            .ok_or_else(|| {
                crate::Error::Database(format!("Integration {} vanished after save", req.protocol))
            })
    }

    pub async fn delete(&self, protocol: Protocol) -> crate::Result<bool> {
        let result = sqlx::query("DELETE FROM integrations WHERE protocol = ?")
            .bind(protocol.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| crate::Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================
// Row Types (sqlx)
// ============================================================

#[derive(sqlx::FromRow)]
struct IntegrationRow {
    id: i64,
    protocol: String,
    host: String,
    port: Option<u16>,
    api_key: Option<String>,
    jwt_credentials: Option<serde_json::Value>,
    max_inputs: Option<u32>,
    max_outputs: Option<u32>,
}

impl TryFrom<IntegrationRow> for Integration {
    type Error = crate::Error;

    fn try_from(row: IntegrationRow) -> crate::Result<Self> {
        let jwt_credentials: Option<JwtCredentials> = row
            .jwt_credentials
            .and_then(|v| serde_json::from_value(v).ok());

        Ok(Self {
            id: row.id,
            protocol: row.protocol.parse()?,
            host: row.host,
            port: row.port,
            api_key: row.api_key.filter(|k| !k.is_empty()),
            jwt_credentials,
            max_inputs: row.max_inputs,
            max_outputs: row.max_outputs,
        })
    }
}
