//! Deep copies of block subtrees under new logical ids.

use std::collections::HashMap;

use layouts_core::error::CoreError;
use layouts_core::status::Status;
use layouts_core::types::{DbId, Position};
use layouts_db::models::block::{Block, BlockTranslation};
use layouts_db::models::collection::{Collection, CollectionItem, CollectionQuery};
use layouts_db::repositories::{BlockRepo, CollectionRepo};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::EngineResult;

use super::row_status;

/// Where the root of a copied subtree lands.
pub(crate) struct CopyTarget<'a> {
    pub layout_id: DbId,
    pub status: Status,
    /// `None` copies a zone root block.
    pub parent: Option<&'a Block>,
    pub placeholder: Option<&'a str>,
    pub position: Position,
}

/// Copy `source` with every descendant, translation and collection.
///
/// Every copied row gets a new id and uuid. Returns the copy of `source`.
pub(crate) async fn copy_subtree(
    conn: &mut SqliteConnection,
    source: &Block,
    target: CopyTarget<'_>,
) -> EngineResult<Block> {
    let source_status = row_status(source.status)?;
    let subtree = BlockRepo::subtree(&mut *conn, source).await?;
    let mut copies: HashMap<DbId, Block> = HashMap::with_capacity(subtree.len());

    for block in &subtree {
        let id = BlockRepo::next_id(&mut *conn).await?;

        let (parent, placeholder, position) = if block.id == source.id {
            (target.parent, target.placeholder.map(str::to_string), target.position)
        } else {
            let parent = block.parent_id.and_then(|parent_id| copies.get(&parent_id));
            (parent, block.placeholder.clone(), block.position)
        };
        let (path, depth) = match parent {
            Some(parent) => (format!("{}{id}/", parent.path), parent.depth + 1),
            None => (format!("/{id}/"), 0),
        };

        let copy = BlockRepo::create(
            &mut *conn,
            &Block {
                id,
                status: target.status.id(),
                uuid: Uuid::new_v4(),
                layout_id: target.layout_id,
                depth,
                path,
                parent_id: parent.map(|parent| parent.id),
                placeholder,
                position,
                ..block.clone()
            },
        )
        .await?;

        for translation in BlockRepo::translations(&mut *conn, block.id, source_status).await? {
            BlockRepo::create_translation(
                &mut *conn,
                &BlockTranslation {
                    block_id: id,
                    status: target.status.id(),
                    ..translation
                },
            )
            .await?;
        }

        copy_collections(&mut *conn, block.id, source_status, id, target.status).await?;
        copies.insert(block.id, copy);
    }

    tracing::debug!(
        source_block_id = source.id,
        blocks = subtree.len(),
        "Block subtree copied"
    );

    copies
        .remove(&source.id)
        .ok_or_else(|| CoreError::not_found("Block", source.id).into())
}

/// Copy the collections of one block, with their items and query.
pub(crate) async fn copy_collections(
    conn: &mut SqliteConnection,
    from_block_id: DbId,
    from_status: Status,
    to_block_id: DbId,
    to_status: Status,
) -> EngineResult<()> {
    let collections = CollectionRepo::list_for_block(&mut *conn, from_block_id, from_status).await?;
    for collection in collections {
        let collection_id = CollectionRepo::next_id(&mut *conn).await?;
        CollectionRepo::create(
            &mut *conn,
            &Collection {
                id: collection_id,
                status: to_status.id(),
                uuid: Uuid::new_v4(),
                block_id: to_block_id,
                ..collection.clone()
            },
        )
        .await?;

        for item in CollectionRepo::list_items(&mut *conn, collection.id, from_status).await? {
            let item_id = CollectionRepo::next_item_id(&mut *conn).await?;
            CollectionRepo::create_item(
                &mut *conn,
                &CollectionItem {
                    id: item_id,
                    status: to_status.id(),
                    uuid: Uuid::new_v4(),
                    collection_id,
                    ..item
                },
            )
            .await?;
        }

        if let Some(query) =
            CollectionRepo::find_query_for_collection(&mut *conn, collection.id, from_status).await?
        {
            let query_id = CollectionRepo::next_query_id(&mut *conn).await?;
            CollectionRepo::create_query(
                &mut *conn,
                &CollectionQuery {
                    id: query_id,
                    status: to_status.id(),
                    uuid: Uuid::new_v4(),
                    collection_id,
                    ..query
                },
            )
            .await?;
        }
    }
    Ok(())
}
