//! SQLite storage backend

use super::traits::{DocumentStore, GraphStore, OpenStore, StorageError, StorageResult};
use crate::graph::{
    CommitSummary, Direction, EdgeId, EntityNode, GraphSnapshot, GraphStats, Mutation, MutationBatch, NodeId,
    RelationEdge,
};
use crate::model::{Document, DocumentId, EntityCategory};
use rusqlite::{params, Connection, OptionalExtension, Params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const NODE_COLUMNS: &str = "id, entity_json, metadata_json";
const EDGE_COLUMNS: &str = "id, source_id, target_id, predicate, metadata_json, created_at";

/// SQLite-backed graph and document store
///
/// One database file holds every document and every document graph.
/// Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Enable WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                document_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                category TEXT NOT NULL,
                entity_json TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                PRIMARY KEY (document_id, id)
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_category
                ON nodes(document_id, category);

            -- One row per name, for lookups without decoding entity_json
            CREATE TABLE IF NOT EXISTS node_names (
                document_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                name_key TEXT NOT NULL,
                is_weak INTEGER NOT NULL,
                PRIMARY KEY (document_id, node_id, name_key),
                FOREIGN KEY (document_id, node_id)
                    REFERENCES nodes(document_id, id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_node_names_key
                ON node_names(document_id, name_key);

            CREATE TABLE IF NOT EXISTS edges (
                id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                predicate TEXT NOT NULL,
                unit_index INTEGER NOT NULL,
                metadata_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (document_id, id),
                UNIQUE (document_id, source_id, target_id, predicate),
                FOREIGN KEY (document_id, source_id)
                    REFERENCES nodes(document_id, id) ON DELETE CASCADE,
                FOREIGN KEY (document_id, target_id)
                    REFERENCES nodes(document_id, id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_edges_source
                ON edges(document_id, source_id);
            CREATE INDEX IF NOT EXISTS idx_edges_target
                ON edges(document_id, target_id);
            CREATE INDEX IF NOT EXISTS idx_edges_unit
                ON edges(document_id, unit_index);
            "#,
        )?;

        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn row_to_node(id: String, entity_json: String, metadata_json: String) -> StorageResult<EntityNode> {
        Ok(EntityNode {
            id: NodeId::from_string(id),
            entity: serde_json::from_str(&entity_json)?,
            metadata: serde_json::from_str(&metadata_json)?,
        })
    }

    fn row_to_edge(
        id: String,
        source_id: String,
        target_id: String,
        predicate: String,
        metadata_json: String,
        created_at: String,
    ) -> StorageResult<RelationEdge> {
        use chrono::DateTime;

        Ok(RelationEdge {
            id: EdgeId::from_string(id),
            source: NodeId::from_string(source_id),
            target: NodeId::from_string(target_id),
            predicate,
            metadata: serde_json::from_str(&metadata_json)?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| StorageError::DateParse(e.to_string()))?
                .with_timezone(&chrono::Utc),
        })
    }

    fn query_nodes<P: Params>(conn: &Connection, sql: &str, params: P) -> StorageResult<Vec<EntityNode>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut nodes = Vec::new();
        for row in rows {
            let (id, entity, metadata) = row?;
            nodes.push(Self::row_to_node(id, entity, metadata)?);
        }
        Ok(nodes)
    }

    fn query_edges<P: Params>(conn: &Connection, sql: &str, params: P) -> StorageResult<Vec<RelationEdge>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in rows {
            let (id, source, target, predicate, metadata, created) = row?;
            edges.push(Self::row_to_edge(id, source, target, predicate, metadata, created)?);
        }
        Ok(edges)
    }

    fn insert_node(conn: &Connection, document: &DocumentId, node: &EntityNode) -> StorageResult<()> {
        conn.execute(
            "INSERT INTO nodes (id, document_id, category, entity_json, metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                node.id.as_str(),
                document.as_str(),
                node.entity.category.as_str(),
                serde_json::to_string(&node.entity)?,
                serde_json::to_string(&node.metadata)?,
            ],
        )?;
        Self::insert_names(conn, document, node)
    }

    fn insert_names(conn: &Connection, document: &DocumentId, node: &EntityNode) -> StorageResult<()> {
        let mut stmt = conn.prepare(
            "INSERT OR REPLACE INTO node_names (document_id, node_id, name_key, is_weak)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for entry in &node.entity.names {
            stmt.execute(params![document.as_str(), node.id.as_str(), entry.key(), entry.is_weak])?;
        }
        Ok(())
    }

    fn update_node(conn: &Connection, document: &DocumentId, node: &EntityNode) -> StorageResult<()> {
        let rows = conn.execute(
            "UPDATE nodes SET category = ?3, entity_json = ?4, metadata_json = ?5
             WHERE document_id = ?1 AND id = ?2",
            params![
                document.as_str(),
                node.id.as_str(),
                node.entity.category.as_str(),
                serde_json::to_string(&node.entity)?,
                serde_json::to_string(&node.metadata)?,
            ],
        )?;
        if rows == 0 {
            return Err(StorageError::NodeNotFound(node.id.to_string()));
        }
        conn.execute(
            "DELETE FROM node_names WHERE document_id = ?1 AND node_id = ?2",
            params![document.as_str(), node.id.as_str()],
        )?;
        Self::insert_names(conn, document, node)
    }

    /// Returns (nodes deleted, edges removed by cascade)
    fn delete_node(conn: &Connection, document: &DocumentId, id: &NodeId) -> StorageResult<(usize, usize)> {
        let edges: i64 = conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE document_id = ?1 AND (source_id = ?2 OR target_id = ?2)",
            params![document.as_str(), id.as_str()],
            |row| row.get(0),
        )?;
        let rows = conn.execute(
            "DELETE FROM nodes WHERE document_id = ?1 AND id = ?2",
            params![document.as_str(), id.as_str()],
        )?;
        if rows == 0 {
            return Ok((0, 0));
        }
        Ok((rows, edges as usize))
    }

    /// Returns true if inserted, false if the triple already existed
    fn insert_edge(conn: &Connection, document: &DocumentId, edge: &RelationEdge) -> StorageResult<bool> {
        let rows = conn.execute(
            r#"
            INSERT INTO edges (id, document_id, source_id, target_id, predicate, unit_index,
                               metadata_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(document_id, source_id, target_id, predicate) DO NOTHING
            "#,
            params![
                edge.id.as_str(),
                document.as_str(),
                edge.source.as_str(),
                edge.target.as_str(),
                edge.predicate,
                edge.metadata.unit_index,
                serde_json::to_string(&edge.metadata)?,
                edge.created_at.to_rfc3339(),
            ],
        )?;
        Ok(rows > 0)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl GraphStore for SqliteStore {
    fn load_graph(&self, document: &DocumentId) -> StorageResult<GraphSnapshot> {
        let conn = self.lock()?;
        let nodes = Self::query_nodes(
            &conn,
            &format!("SELECT {} FROM nodes WHERE document_id = ?1 ORDER BY rowid", NODE_COLUMNS),
            params![document.as_str()],
        )?;
        let edges = Self::query_edges(
            &conn,
            &format!("SELECT {} FROM edges WHERE document_id = ?1 ORDER BY rowid", EDGE_COLUMNS),
            params![document.as_str()],
        )?;
        Ok(GraphSnapshot { nodes, edges })
    }

    fn find_by_name(&self, document: &DocumentId, name: &str) -> StorageResult<Vec<EntityNode>> {
        let conn = self.lock()?;
        Self::query_nodes(
            &conn,
            "SELECT n.id, n.entity_json, n.metadata_json
             FROM nodes n
             JOIN node_names k ON k.document_id = n.document_id AND k.node_id = n.id
             WHERE n.document_id = ?1 AND k.name_key = ?2
             ORDER BY n.rowid",
            params![document.as_str(), crate::model::normalize_name(name)],
        )
    }

    fn find_by_category(&self, document: &DocumentId, category: &EntityCategory) -> StorageResult<Vec<EntityNode>> {
        let conn = self.lock()?;
        Self::query_nodes(
            &conn,
            &format!(
                "SELECT {} FROM nodes WHERE document_id = ?1 AND lower(category) = lower(?2) ORDER BY rowid",
                NODE_COLUMNS
            ),
            params![document.as_str(), category.as_str()],
        )
    }

    fn relationships_of(
        &self,
        document: &DocumentId,
        node: &NodeId,
        direction: Option<Direction>,
    ) -> StorageResult<Vec<RelationEdge>> {
        let conn = self.lock()?;
        let filter = match direction {
            Some(Direction::Outgoing) => "source_id = ?2",
            Some(Direction::Incoming) => "target_id = ?2",
            None => "(source_id = ?2 OR target_id = ?2)",
        };
        Self::query_edges(
            &conn,
            &format!(
                "SELECT {} FROM edges WHERE document_id = ?1 AND {} ORDER BY rowid",
                EDGE_COLUMNS, filter
            ),
            params![document.as_str(), node.as_str()],
        )
    }

    fn relationships_in_unit(&self, document: &DocumentId, unit_index: u32) -> StorageResult<Vec<RelationEdge>> {
        let conn = self.lock()?;
        Self::query_edges(
            &conn,
            &format!(
                "SELECT {} FROM edges WHERE document_id = ?1 AND unit_index = ?2 ORDER BY rowid",
                EDGE_COLUMNS
            ),
            params![document.as_str(), unit_index],
        )
    }

    fn stats(&self, document: &DocumentId) -> StorageResult<GraphStats> {
        let conn = self.lock()?;
        let mut stats = GraphStats::default();

        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) FROM nodes WHERE document_id = ?1 GROUP BY category",
        )?;
        let rows = stmt.query_map(params![document.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (category, count) = row?;
            stats.nodes += count as usize;
            stats.by_category.insert(category, count as usize);
        }

        let mut stmt = conn.prepare(
            "SELECT predicate, COUNT(*) FROM edges WHERE document_id = ?1 GROUP BY predicate",
        )?;
        let rows = stmt.query_map(params![document.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (predicate, count) = row?;
            stats.edges += count as usize;
            stats.by_predicate.insert(predicate, count as usize);
        }

        Ok(stats)
    }

    fn reset(&self, document: &DocumentId) -> StorageResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM edges WHERE document_id = ?1", params![document.as_str()])?;
        let nodes = tx.execute("DELETE FROM nodes WHERE document_id = ?1", params![document.as_str()])?;
        tx.commit()?;
        Ok(nodes)
    }

    fn commit(&self, document: &DocumentId, batch: &MutationBatch) -> StorageResult<CommitSummary> {
        let mut conn = self.lock()?;
        // Dropping the transaction on an early return rolls it back
        let tx = conn.transaction()?;
        let mut summary = CommitSummary::default();

        for mutation in &batch.mutations {
            match mutation {
                Mutation::CreateNode(node) => {
                    Self::insert_node(&tx, document, node)?;
                    summary.nodes_created += 1;
                }
                Mutation::UpdateNode(node) => {
                    Self::update_node(&tx, document, node)?;
                    summary.nodes_updated += 1;
                }
                Mutation::DeleteNode(id) => {
                    let (nodes, edges) = Self::delete_node(&tx, document, id)?;
                    summary.nodes_deleted += nodes;
                    summary.edges_deleted += edges;
                }
                Mutation::CreateEdge(edge) => {
                    if Self::insert_edge(&tx, document, edge)? {
                        summary.edges_created += 1;
                    } else {
                        summary.edges_existing += 1;
                    }
                }
            }
        }

        tx.commit()?;
        Ok(summary)
    }
}

impl DocumentStore for SqliteStore {
    fn save_document(&self, document: &Document) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO documents (id, name, document_json, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                document_json = excluded.document_json,
                updated_at = excluded.updated_at
            "#,
            params![
                document.id.as_str(),
                document.name,
                serde_json::to_string(document)?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn load_document(&self, id: &DocumentId) -> StorageResult<Option<Document>> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT document_json FROM documents WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn list_documents(&self) -> StorageResult<Vec<DocumentId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM documents ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(DocumentId::from_string(row?));
        }
        Ok(ids)
    }
}
