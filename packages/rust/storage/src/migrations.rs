//! SQL migration definitions for the docbridge state database.
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
    vec![
        Migration {
            version: 1,
            description: "Initial schema: keyed documents",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One JSON document per persisted artifact (progress, mapping, discrepancies)
CREATE TABLE IF NOT EXISTS documents (
    key        TEXT PRIMARY KEY,
    body       TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Progress log as one row per ID",
            sql: r#"
CREATE TABLE IF NOT EXISTS progress_entries (
    id             TEXT PRIMARY KEY,
    status         TEXT NOT NULL,
    schema_version INTEGER NOT NULL,
    body           TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_progress_entries_status ON progress_entries(status);

-- Carry over a progress log stored as a single document.
INSERT OR IGNORE INTO progress_entries (id, status, schema_version, body, updated_at)
SELECT entry.key,
       json_extract(entry.value, '$.status'),
       json_extract(doc.body, '$.schema_version'),
       entry.value,
       doc.updated_at
FROM documents AS doc, json_each(doc.body, '$.entries') AS entry
WHERE doc.key = 'progress';

DELETE FROM documents WHERE key = 'progress';

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
