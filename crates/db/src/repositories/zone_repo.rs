//! Repository for the `zones` table.

use layouts_core::status::Status;
use layouts_core::types::DbId;
use sqlx::SqliteConnection;

use crate::models::layout::Zone;

const COLUMNS: &str = "layout_id, status, identifier, root_block_id, linked_layout_id, \
    linked_zone_identifier";

/// Provides data access for layout zones.
pub struct ZoneRepo;

impl ZoneRepo {
    pub async fn create(conn: &mut SqliteConnection, zone: &Zone) -> Result<Zone, sqlx::Error> {
        let query = format!(
            "INSERT INTO zones ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Zone>(&query)
            .bind(zone.layout_id)
            .bind(zone.status)
            .bind(&zone.identifier)
            .bind(zone.root_block_id)
            .bind(zone.linked_layout_id)
            .bind(&zone.linked_zone_identifier)
            .fetch_one(conn)
            .await
    }

    pub async fn find(
        conn: &mut SqliteConnection,
        layout_id: DbId,
        status: Status,
        identifier: &str,
    ) -> Result<Option<Zone>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM zones WHERE layout_id = ?1 AND status = ?2 AND identifier = ?3"
        );
        sqlx::query_as::<_, Zone>(&query)
            .bind(layout_id)
            .bind(status.id())
            .bind(identifier)
            .fetch_optional(conn)
            .await
    }

    /// Zones of a layout copy, ordered by identifier.
    pub async fn list(
        conn: &mut SqliteConnection,
        layout_id: DbId,
        status: Status,
    ) -> Result<Vec<Zone>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM zones WHERE layout_id = ?1 AND status = ?2 ORDER BY identifier"
        );
        sqlx::query_as::<_, Zone>(&query)
            .bind(layout_id)
            .bind(status.id())
            .fetch_all(conn)
            .await
    }

    /// Set or clear (`None`) the link of a zone.
    pub async fn set_link(
        conn: &mut SqliteConnection,
        layout_id: DbId,
        status: Status,
        identifier: &str,
        linked: Option<(DbId, &str)>,
    ) -> Result<Option<Zone>, sqlx::Error> {
        let query = format!(
            "UPDATE zones SET linked_layout_id = ?4, linked_zone_identifier = ?5 \
             WHERE layout_id = ?1 AND status = ?2 AND identifier = ?3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Zone>(&query)
            .bind(layout_id)
            .bind(status.id())
            .bind(identifier)
            .bind(linked.map(|(id, _)| id))
            .bind(linked.map(|(_, zone)| zone))
            .fetch_optional(conn)
            .await
    }

    /// Zone owning the given root block.
    pub async fn find_by_root_block(
        conn: &mut SqliteConnection,
        root_block_id: DbId,
        status: Status,
    ) -> Result<Option<Zone>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM zones WHERE root_block_id = ?1 AND status = ?2"
        );
        sqlx::query_as::<_, Zone>(&query)
            .bind(root_block_id)
            .bind(status.id())
            .fetch_optional(conn)
            .await
    }

    /// Clear every link, in any status, pointing at zones of `linked_layout_id`.
    pub async fn unlink_all_to(
        conn: &mut SqliteConnection,
        linked_layout_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE zones SET linked_layout_id = NULL, linked_zone_identifier = NULL \
             WHERE linked_layout_id = ?1",
        )
        .bind(linked_layout_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}
