//! Reads and writes against the listing catalog's `listing_versions` table.
//!
//! The table belongs to the catalog; the media core only touches the active
//! version of a listing identity.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;

use propmedia_core::models::{ListingSnapshot, ListingStatus, PropertyType};

use super::PgLedgerSession;
use crate::db::ledger::ListingStore;

#[async_trait]
impl ListingStore for PgLedgerSession {
    async fn get_active_listing(
        &mut self,
        listing_identity_id: i64,
    ) -> Result<Option<ListingSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT id, listing_identity_id, owner_id, status, property_type
            FROM listing_versions
            WHERE listing_identity_id = $1 AND is_active = TRUE
            ORDER BY id DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(listing_identity_id)
        .fetch_optional(self.conn()?)
        .await
        .context("Failed to load active listing version")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.try_get("status")?;
        let property_type: Option<String> = row.try_get("property_type")?;
        Ok(Some(ListingSnapshot {
            identity_id: row.try_get("listing_identity_id")?,
            version_id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            status: ListingStatus::parse(&status),
            property_type: PropertyType::parse(property_type.as_deref().unwrap_or_default()),
        }))
    }

    #[tracing::instrument(skip(self, status), fields(status = %status))]
    async fn update_listing_status(
        &mut self,
        listing_identity_id: i64,
        status: &ListingStatus,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE listing_versions
            SET status = $2
            WHERE listing_identity_id = $1 AND is_active = TRUE
            "#,
        )
        .bind(listing_identity_id)
        .bind(status.as_str())
        .execute(self.conn()?)
        .await
        .context("Failed to update listing status")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Listing {} has no active version", listing_identity_id);
        }
        Ok(())
    }
}
