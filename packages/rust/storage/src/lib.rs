//! libSQL-backed graph storage.
//!
//! [`GraphStore`] is the storage contract the enrichment pipeline consumes:
//! node lookup, find-or-create, update, and raw query execution over
//! [`StoragePayload`]s. [`Storage`] implements it on an embedded libSQL
//! database holding nodes, their types, literal properties, and references.

mod migrations;

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, Value, params};
use tracing::{debug, info, warn};
use uuid::Uuid;
use venuebot_shared::namespace::query;
use venuebot_shared::{FindResult, Literal, Result, ResultCollection, StoragePayload, VenueBotError};

/// Storage operations over graph nodes.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Fetch the node named by `payload.about`.
    async fn get_node(&self, payload: &StoragePayload) -> Result<StoragePayload>;

    /// Find nodes matching the payload's types and property values. Honors
    /// `flags.create_if_missing`; every result carries `flags.find_result`.
    async fn find_nodes(&self, payload: &StoragePayload) -> Result<ResultCollection>;

    /// Merge the payload into the node named by `payload.about`.
    async fn update_node(&self, payload: &StoragePayload) -> Result<ResultCollection>;

    /// Run the query text held in the payload's query property.
    async fn execute_query(&self, payload: &StoragePayload) -> Result<ResultCollection>;
}

fn query_err(e: libsql::Error) -> VenueBotError {
    VenueBotError::QueryFailure(e.to_string())
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    node_base: String,
}

impl Storage {
    /// Open or create a database at `path`. Created nodes are named
    /// `<node_base><uuid>`.
    pub async fn open(path: &Path, node_base: impl Into<String>) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VenueBotError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| VenueBotError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| VenueBotError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            node_base: node_base.into(),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    VenueBotError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Node reads
    // -----------------------------------------------------------------------

    /// Load a node with its types, properties, and references.
    async fn load_node(&self, uri: &str) -> Result<Option<StoragePayload>> {
        let mut rows = self
            .conn
            .query("SELECT uri FROM nodes WHERE uri = ?1", params![uri])
            .await
            .map_err(query_err)?;
        if rows.next().await.map_err(query_err)?.is_none() {
            return Ok(None);
        }

        let mut node = StoragePayload::about(uri);

        let mut rows = self
            .conn
            .query(
                "SELECT type_uri FROM node_types WHERE node_uri = ?1",
                params![uri],
            )
            .await
            .map_err(query_err)?;
        while let Some(row) = rows.next().await.map_err(query_err)? {
            node.add_type(row.get::<String>(0).map_err(query_err)?);
        }

        let mut rows = self
            .conn
            .query(
                "SELECT predicate, value_json FROM node_properties
                 WHERE node_uri = ?1 ORDER BY predicate, position",
                params![uri],
            )
            .await
            .map_err(query_err)?;
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let predicate = row.get::<String>(0).map_err(query_err)?;
            let raw = row.get::<String>(1).map_err(query_err)?;
            let value: Literal = serde_json::from_str(&raw)
                .map_err(|e| VenueBotError::parse(format!("stored value for {predicate}: {e}")))?;
            node.properties.entry(predicate).or_default().push(value);
        }

        let mut rows = self
            .conn
            .query(
                "SELECT predicate, target_uri FROM node_references
                 WHERE node_uri = ?1 ORDER BY predicate, rowid",
                params![uri],
            )
            .await
            .map_err(query_err)?;
        while let Some(row) = rows.next().await.map_err(query_err)? {
            node.add_reference(
                row.get::<String>(0).map_err(query_err)?,
                row.get::<String>(1).map_err(query_err)?,
            );
        }

        Ok(Some(node))
    }

    /// URIs of nodes carrying every type in `types`.
    async fn candidate_uris(&self, types: &BTreeSet<String>) -> Result<Vec<String>> {
        let mut rows = if types.is_empty() {
            self.conn
                .query("SELECT uri FROM nodes ORDER BY created_at, uri", params![])
                .await
                .map_err(query_err)?
        } else {
            let placeholders = (1..=types.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT t.node_uri FROM node_types t JOIN nodes n ON n.uri = t.node_uri
                 WHERE t.type_uri IN ({placeholders})
                 GROUP BY t.node_uri HAVING COUNT(DISTINCT t.type_uri) = {}
                 ORDER BY n.created_at, t.node_uri",
                types.len()
            );
            let values: Vec<Value> = types.iter().map(|t| Value::Text(t.clone())).collect();
            self.conn.query(&sql, values).await.map_err(query_err)?
        };

        let mut uris = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            uris.push(row.get::<String>(0).map_err(query_err)?);
        }
        Ok(uris)
    }

    // -----------------------------------------------------------------------
    // Node writes
    // -----------------------------------------------------------------------

    /// Upsert `uri` and merge the payload's types, properties, and references
    /// in one transaction. Each predicate present in the payload has its
    /// values replaced.
    async fn write_node(&self, uri: &str, payload: &StoragePayload) -> Result<()> {
        let tx = self.conn.transaction().await.map_err(query_err)?;
        match write_rows(&tx, uri, payload).await {
            Ok(()) => tx.commit().await.map_err(query_err),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(%uri, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

async fn write_rows(conn: &Connection, uri: &str, payload: &StoragePayload) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO nodes (uri, created_at, updated_at) VALUES (?1, ?2, ?2)
         ON CONFLICT(uri) DO UPDATE SET updated_at = excluded.updated_at",
        params![uri, now.as_str()],
    )
    .await
    .map_err(query_err)?;

    for type_uri in &payload.types {
        conn.execute(
            "INSERT OR IGNORE INTO node_types (node_uri, type_uri) VALUES (?1, ?2)",
            params![uri, type_uri.as_str()],
        )
        .await
        .map_err(query_err)?;
    }

    for (predicate, values) in &payload.properties {
        conn.execute(
            "DELETE FROM node_properties WHERE node_uri = ?1 AND predicate = ?2",
            params![uri, predicate.as_str()],
        )
        .await
        .map_err(query_err)?;

        for (position, value) in values.iter().enumerate() {
            let json =
                serde_json::to_string(value).map_err(|e| VenueBotError::validation(e.to_string()))?;
            conn.execute(
                "INSERT INTO node_properties (node_uri, predicate, position, value_json, value_text)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![uri, predicate.as_str(), position as i64, json, value.as_str()],
            )
            .await
            .map_err(query_err)?;
        }
    }

    for (predicate, targets) in &payload.references {
        for target in targets {
            conn.execute(
                "INSERT OR IGNORE INTO node_references (node_uri, predicate, target_uri)
                 VALUES (?1, ?2, ?3)",
                params![uri, predicate.as_str(), target.as_str()],
            )
            .await
            .map_err(query_err)?;
        }
    }

    Ok(())
}

/// Whether `node` carries every property value and reference of `template`.
fn matches_template(node: &StoragePayload, template: &StoragePayload) -> bool {
    let properties = template.properties.iter().all(|(key, values)| {
        let stored = node.property(key);
        values.iter().all(|v| stored.contains(v))
    });
    let references = template.references.iter().all(|(predicate, targets)| {
        node.references
            .get(predicate)
            .is_some_and(|stored| targets.iter().all(|t| stored.contains(t)))
    });
    properties && references
}

fn literal_to_value(literal: &Literal) -> Value {
    match literal {
        Literal::Text(s) => Value::Text(s.clone()),
        Literal::Integer(i) => Value::Integer(*i),
        Literal::Float(f) => Value::Real(*f),
        Literal::Boolean(b) => Value::Integer(i64::from(*b)),
    }
}

fn value_to_literal(value: Value) -> Option<Literal> {
    match value {
        Value::Text(s) => Some(Literal::Text(s)),
        Value::Integer(i) => Some(Literal::Integer(i)),
        Value::Real(f) => Some(Literal::Float(f)),
        Value::Null | Value::Blob(_) => None,
    }
}

#[async_trait]
impl GraphStore for Storage {
    async fn get_node(&self, payload: &StoragePayload) -> Result<StoragePayload> {
        let uri = payload
            .about
            .as_deref()
            .ok_or_else(|| VenueBotError::validation("get_node requires a node uri"))?;
        self.load_node(uri)
            .await?
            .ok_or_else(|| VenueBotError::no_match(format!("node {uri} does not exist")))
    }

    async fn find_nodes(&self, payload: &StoragePayload) -> Result<ResultCollection> {
        let candidates = match &payload.about {
            Some(uri) => vec![uri.clone()],
            None => self.candidate_uris(&payload.types).await?,
        };

        let mut results = Vec::new();
        for uri in candidates {
            if let Some(mut node) = self.load_node(&uri).await? {
                if node.types.is_superset(&payload.types) && matches_template(&node, payload) {
                    node.flags.find_result = Some(FindResult::Found);
                    results.push(node);
                }
            }
        }

        if results.is_empty() && payload.flags.create_if_missing {
            let uri = payload
                .about
                .clone()
                .unwrap_or_else(|| format!("{}{}", self.node_base, Uuid::now_v7()));
            self.write_node(&uri, payload).await?;
            let mut node = self.load_node(&uri).await?.ok_or_else(|| {
                VenueBotError::QueryFailure(format!("created node {uri} could not be read back"))
            })?;
            node.flags.find_result = Some(FindResult::Created);
            info!(%uri, "created node");
            results.push(node);
        }

        debug!(count = results.len(), "find_nodes complete");
        Ok(ResultCollection::new(results))
    }

    async fn update_node(&self, payload: &StoragePayload) -> Result<ResultCollection> {
        let uri = payload
            .about
            .as_deref()
            .ok_or_else(|| VenueBotError::validation("update_node requires a node uri"))?;
        self.write_node(uri, payload).await?;
        let node = self.load_node(uri).await?.ok_or_else(|| {
            VenueBotError::QueryFailure(format!("updated node {uri} could not be read back"))
        })?;
        debug!(%uri, "node updated");
        Ok(ResultCollection::new(vec![node]))
    }

    async fn execute_query(&self, payload: &StoragePayload) -> Result<ResultCollection> {
        let text = payload
            .property(query::TEXT)
            .first()
            .and_then(Literal::as_str)
            .ok_or_else(|| VenueBotError::validation("query payload carries no query text"))?;

        let params: Vec<Value> = payload.flags.parameters.iter().map(literal_to_value).collect();
        let mut rows = self.conn.query(text, params).await.map_err(query_err)?;

        let columns: Vec<String> = (0..rows.column_count())
            .map(|i| rows.column_name(i).unwrap_or_default().to_string())
            .collect();

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let mut result = StoragePayload::new();
            for (i, column) in columns.iter().enumerate() {
                let Some(value) = value_to_literal(row.get_value(i as i32).map_err(query_err)?)
                else {
                    continue;
                };
                if column == "node" {
                    result.about = value.as_str().map(String::from);
                    continue;
                }
                let key = payload
                    .flags
                    .translation_key
                    .get(column)
                    .cloned()
                    .unwrap_or_else(|| column.clone());
                result.flags.columns.insert(key, value);
            }
            results.push(result);
        }

        debug!(rows = results.len(), "query executed");
        Ok(ResultCollection::new(results))
    }
}
