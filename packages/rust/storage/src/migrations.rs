//! SQL migration definitions for the venuebot graph database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: nodes, node_types, node_properties, node_references",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Graph nodes
CREATE TABLE IF NOT EXISTS nodes (
    uri        TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Semantic types of each node
CREATE TABLE IF NOT EXISTS node_types (
    node_uri TEXT NOT NULL REFERENCES nodes(uri) ON DELETE CASCADE,
    type_uri TEXT NOT NULL,
    PRIMARY KEY (node_uri, type_uri)
);

CREATE INDEX IF NOT EXISTS idx_node_types_type ON node_types(type_uri);

-- Literal property values, ordered per predicate
CREATE TABLE IF NOT EXISTS node_properties (
    node_uri   TEXT NOT NULL REFERENCES nodes(uri) ON DELETE CASCADE,
    predicate  TEXT NOT NULL,
    position   INTEGER NOT NULL,
    value_json TEXT NOT NULL,
    value_text TEXT,
    PRIMARY KEY (node_uri, predicate, position)
);

CREATE INDEX IF NOT EXISTS idx_node_properties_predicate ON node_properties(predicate, value_text);

-- Node-to-node references
CREATE TABLE IF NOT EXISTS node_references (
    node_uri   TEXT NOT NULL REFERENCES nodes(uri) ON DELETE CASCADE,
    predicate  TEXT NOT NULL,
    target_uri TEXT NOT NULL,
    PRIMARY KEY (node_uri, predicate, target_uri)
);

CREATE INDEX IF NOT EXISTS idx_node_references_target ON node_references(target_uri, predicate);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
