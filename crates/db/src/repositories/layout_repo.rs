//! Repository for the `layouts` and `layout_translations` tables.

use layouts_core::status::{Status, StatusId};
use layouts_core::types::{DbId, Timestamp};
use sqlx::SqliteConnection;

use crate::models::layout::{Layout, UpdateLayout};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, status, uuid, layout_type, name, description, shared, \
    main_locale, created_at, updated_at";

/// Provides data access for layouts.
pub struct LayoutRepo;

impl LayoutRepo {
    /// Allocate the next logical layout id.
    pub async fn next_id(conn: &mut SqliteConnection) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM layouts")
            .fetch_one(conn)
            .await
    }

    /// Insert a layout row as given.
    pub async fn create(
        conn: &mut SqliteConnection,
        layout: &Layout,
    ) -> Result<Layout, sqlx::Error> {
        let query = format!(
            "INSERT INTO layouts ({COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Layout>(&query)
            .bind(layout.id)
            .bind(layout.status)
            .bind(layout.uuid)
            .bind(&layout.layout_type)
            .bind(&layout.name)
            .bind(&layout.description)
            .bind(layout.shared)
            .bind(&layout.main_locale)
            .bind(layout.created_at)
            .bind(layout.updated_at)
            .fetch_one(conn)
            .await
    }

    /// Find one status copy of a layout.
    pub async fn find(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
    ) -> Result<Option<Layout>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM layouts WHERE id = ?1 AND status = ?2");
        sqlx::query_as::<_, Layout>(&query)
            .bind(id)
            .bind(status.id())
            .fetch_optional(conn)
            .await
    }

    /// Published layouts, plus drafts of never-published layouts when
    /// `include_drafts` is set. Ordered by name.
    pub async fn list(
        conn: &mut SqliteConnection,
        include_drafts: bool,
    ) -> Result<Vec<Layout>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM layouts l \
             WHERE l.status = ?1 \
                OR (?3 AND l.status = ?2 AND NOT EXISTS \
                    (SELECT 1 FROM layouts p WHERE p.id = l.id AND p.status = ?1)) \
             ORDER BY l.name, l.id"
        );
        sqlx::query_as::<_, Layout>(&query)
            .bind(Status::Published.id())
            .bind(Status::Draft.id())
            .bind(include_drafts)
            .fetch_all(conn)
            .await
    }

    /// Published shared layouts, ordered by name.
    pub async fn list_shared(conn: &mut SqliteConnection) -> Result<Vec<Layout>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM layouts WHERE status = ?1 AND shared = 1 ORDER BY name, id"
        );
        sqlx::query_as::<_, Layout>(&query)
            .bind(Status::Published.id())
            .fetch_all(conn)
            .await
    }

    /// Published layouts with at least one published zone linked to
    /// `shared_layout_id`.
    pub async fn list_related(
        conn: &mut SqliteConnection,
        shared_layout_id: DbId,
    ) -> Result<Vec<Layout>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM layouts l \
             WHERE l.status = ?1 AND EXISTS \
                (SELECT 1 FROM zones z \
                 WHERE z.layout_id = l.id AND z.status = ?1 AND z.linked_layout_id = ?2) \
             ORDER BY l.name, l.id"
        );
        sqlx::query_as::<_, Layout>(&query)
            .bind(Status::Published.id())
            .bind(shared_layout_id)
            .fetch_all(conn)
            .await
    }

    /// Whether a non-blank `name` is taken by a layout other than `exclude_id`.
    pub async fn name_exists(
        conn: &mut SqliteConnection,
        name: &str,
        exclude_id: Option<DbId>,
    ) -> Result<bool, sqlx::Error> {
        if name.trim().is_empty() {
            return Ok(false);
        }
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM layouts \
             WHERE TRIM(name) <> '' AND name = ?1 AND (?2 IS NULL OR id <> ?2))",
        )
        .bind(name)
        .bind(exclude_id)
        .fetch_one(conn)
        .await
    }

    /// Partially update a layout copy. Uses `COALESCE` so only provided
    /// fields change.
    pub async fn update(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
        dto: &UpdateLayout,
        now: Timestamp,
    ) -> Result<Option<Layout>, sqlx::Error> {
        let query = format!(
            "UPDATE layouts SET \
                 name        = COALESCE(?3, name), \
                 description = COALESCE(?4, description), \
                 updated_at  = ?5 \
             WHERE id = ?1 AND status = ?2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Layout>(&query)
            .bind(id)
            .bind(status.id())
            .bind(&dto.name)
            .bind(&dto.description)
            .bind(now)
            .fetch_optional(conn)
            .await
    }

    /// Set the name of a layout copy.
    pub async fn set_name(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
        name: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE layouts SET name = ?3 WHERE id = ?1 AND status = ?2")
            .bind(id)
            .bind(status.id())
            .bind(name)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Bump `updated_at` of a layout copy.
    pub async fn touch(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
        now: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE layouts SET updated_at = ?3 WHERE id = ?1 AND status = ?2")
            .bind(id)
            .bind(status.id())
            .bind(now)
            .execute(conn)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Translations
    // -----------------------------------------------------------------------

    /// Locales of a layout copy, main locale included.
    pub async fn locales(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT locale FROM layout_translations \
             WHERE layout_id = ?1 AND status = ?2 ORDER BY locale",
        )
        .bind(id)
        .bind(status.id())
        .fetch_all(conn)
        .await
    }

    pub async fn add_locale(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
        locale: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO layout_translations (layout_id, status, locale) VALUES (?1, ?2, ?3)",
        )
        .bind(id)
        .bind(status.id())
        .bind(locale)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Returns `true` if the locale was present.
    pub async fn remove_locale(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
        locale: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM layout_translations WHERE layout_id = ?1 AND status = ?2 AND locale = ?3",
        )
        .bind(id)
        .bind(status.id())
        .bind(locale)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Raw status ids of every copy of a layout.
    pub async fn statuses(
        conn: &mut SqliteConnection,
        id: DbId,
    ) -> Result<Vec<StatusId>, sqlx::Error> {
        sqlx::query_scalar("SELECT status FROM layouts WHERE id = ?1 ORDER BY status")
            .bind(id)
            .fetch_all(conn)
            .await
    }
}
