// src/database/postgres.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use super::{Datastore, LogSource};
use crate::classifier::ParsedCertificate;

/// PostgreSQL datastore
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        info!("Connecting to PostgreSQL database");

        // sqlx 0.8.x doesn't recognize 'channel_binding'
        let cleaned_url = Self::clean_connection_string(database_url);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(&cleaned_url)
            .await
            .context("Failed to connect to PostgreSQL database")?;

        info!("Connected to PostgreSQL successfully");

        Ok(Self { pool })
    }

    /// Remove connection string parameters sqlx does not understand
    fn clean_connection_string(url_str: &str) -> String {
        use url::Url;

        let Ok(mut url) = Url::parse(url_str) else {
            return url_str.to_string();
        };

        let unsupported_params = ["channel_binding"];
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !unsupported_params.contains(&key.as_ref()))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }

        url.to_string()
    }

    /// Create tables if they do not exist yet
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS certificate_log (
                id BIGSERIAL PRIMARY KEY,
                x509cert BYTEA NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create certificate_log table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS watched_certificate_cache (
                id BIGSERIAL PRIMARY KEY,
                version INTEGER NOT NULL,
                serial_num TEXT NOT NULL,
                not_before BIGINT NOT NULL,
                not_after BIGINT NOT NULL,
                issuer TEXT NOT NULL,
                subject_common_name TEXT NOT NULL,
                subject_country TEXT NOT NULL,
                subject_state TEXT NOT NULL,
                subject_location TEXT NOT NULL,
                subject_organization TEXT NOT NULL,
                subject_organization_unit TEXT NOT NULL,
                dns_names TEXT[] NOT NULL,
                fingerprint TEXT NOT NULL,
                certificate_log_id BIGINT NOT NULL REFERENCES certificate_log(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create watched_certificate_cache table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS log_source (
                id BIGSERIAL PRIMARY KEY,
                description TEXT NOT NULL,
                pubkey TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                max_merge_delay BIGINT NOT NULL,
                operated_by TEXT NOT NULL,
                last_seen_id BIGINT NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create log_source table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_watched_common_name
            ON watched_certificate_cache(subject_common_name)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create index on subject_common_name")?;

        info!("Database migrations completed successfully");

        Ok(())
    }
}

#[async_trait]
impl Datastore for PostgresBackend {
    async fn record_certificate(&self, der: &[u8]) -> Result<i64> {
        let row = sqlx::query("INSERT INTO certificate_log (x509cert) VALUES ($1) RETURNING id")
            .bind(der)
            .fetch_one(&self.pool)
            .await
            .context("Failed to insert certificate")?;

        Ok(row.get::<i64, _>("id"))
    }

    async fn record_match(&self, cert: &ParsedCertificate, certificate_id: i64) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO watched_certificate_cache (
                version, serial_num, not_before, not_after, issuer,
                subject_common_name, subject_country, subject_state,
                subject_location, subject_organization, subject_organization_unit,
                dns_names, fingerprint, certificate_log_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id
            "#,
        )
        .bind(cert.version as i32)
        .bind(&cert.serial)
        .bind(cert.not_before)
        .bind(cert.not_after)
        .bind(&cert.issuer)
        .bind(cert.subject_common_name.clone().unwrap_or_default())
        .bind(cert.country.join(","))
        .bind(cert.state.join(","))
        .bind(cert.locality.join(","))
        .bind(cert.organization.join(","))
        .bind(cert.organizational_unit.join(","))
        .bind(&cert.dns_names)
        .bind(&cert.fingerprint)
        .bind(certificate_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert matched certificate")?;

        debug!(
            "Saved match to database: {}",
            cert.subject_common_name.as_deref().unwrap_or("<no CN>")
        );

        Ok(row.get::<i64, _>("id"))
    }

    async fn upsert_log_source(&self, source: &LogSource) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO log_source (description, pubkey, url, max_merge_delay, operated_by)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (url)
            DO UPDATE SET description = $1, pubkey = $2, max_merge_delay = $4, operated_by = $5
            RETURNING id
            "#,
        )
        .bind(&source.description)
        .bind(&source.key)
        .bind(&source.url)
        .bind(source.mmd as i64)
        .bind(&source.operator)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert log source")?;

        Ok(row.get::<i64, _>("id"))
    }

    async fn log_sources(&self) -> Result<Vec<LogSource>> {
        let rows = sqlx::query(
            r#"
            SELECT description, pubkey, url, max_merge_delay, operated_by
            FROM log_source
            WHERE pubkey <> ''
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch log sources")?;

        Ok(rows
            .into_iter()
            .map(|row| LogSource {
                description: row.get("description"),
                key: row.get("pubkey"),
                url: row.get("url"),
                mmd: row.get::<i64, _>("max_merge_delay") as u64,
                operator: row.get("operated_by"),
            })
            .collect())
    }

    async fn last_seen_index(&self, log_url: &str) -> Result<Option<u64>> {
        let row = sqlx::query("SELECT last_seen_id FROM log_source WHERE url = $1")
            .bind(log_url)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch last seen index")?;

        Ok(row.map(|r| r.get::<i64, _>("last_seen_id") as u64))
    }

    async fn update_last_seen(&self, log_url: &str, index: u64) -> Result<()> {
        // Logs configured by hand may not have a row yet
        sqlx::query(
            r#"
            INSERT INTO log_source (description, pubkey, url, max_merge_delay, operated_by, last_seen_id)
            VALUES ('', '', $1, 0, '', $2)
            ON CONFLICT (url)
            DO UPDATE SET last_seen_id = $2
            "#,
        )
        .bind(log_url)
        .bind(index as i64)
        .execute(&self.pool)
        .await
        .context("Failed to update last seen index")?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_connection_string_drops_channel_binding() {
        let cleaned = PostgresBackend::clean_connection_string(
            "postgres://user:pw@db.example/ct?sslmode=require&channel_binding=require",
        );
        assert_eq!(cleaned, "postgres://user:pw@db.example/ct?sslmode=require");

        let cleaned =
            PostgresBackend::clean_connection_string("postgres://db.example/ct?channel_binding=require");
        assert_eq!(cleaned, "postgres://db.example/ct");
    }

    #[test]
    fn test_clean_connection_string_passthrough() {
        assert_eq!(
            PostgresBackend::clean_connection_string("not a url"),
            "not a url"
        );
    }
}
