//! Idempotent schema steps for the replica database.

use rusqlite::Connection;

/// Schema steps applied in order; each is safe to re-run.
pub(crate) const SCHEMA_STEPS: &[(&str, &str)] = &[
    (
        "create nodes",
        "CREATE TABLE IF NOT EXISTS nodes (
            id INTEGER PRIMARY KEY,
            lon REAL NOT NULL,
            lat REAL NOT NULL,
            version INTEGER NOT NULL,
            tags TEXT NOT NULL,
            observed_at TEXT
        )",
    ),
    (
        "index nodes by position",
        "CREATE INDEX IF NOT EXISTS nodes_lon_lat ON nodes (lon, lat)",
    ),
    (
        "create ways",
        "CREATE TABLE IF NOT EXISTS ways (
            id INTEGER PRIMARY KEY,
            node_ids TEXT NOT NULL,
            version INTEGER NOT NULL,
            tags TEXT NOT NULL,
            observed_at TEXT,
            centreline TEXT,
            min_lon REAL,
            min_lat REAL,
            max_lon REAL,
            max_lat REAL,
            centreline_rev INTEGER NOT NULL DEFAULT 0,
            casing_rev INTEGER,
            width REAL,
            casing TEXT,
            dirty INTEGER NOT NULL DEFAULT 0
        )",
    ),
    (
        "index ways by extent",
        "CREATE INDEX IF NOT EXISTS ways_extent ON ways (min_lon, max_lon, min_lat, max_lat)",
    ),
    (
        "index dirty ways",
        "CREATE INDEX IF NOT EXISTS ways_dirty ON ways (dirty)",
    ),
    (
        "create node_ways",
        "CREATE TABLE IF NOT EXISTS node_ways (
            way_id INTEGER NOT NULL,
            idx INTEGER NOT NULL,
            node_id INTEGER NOT NULL,
            PRIMARY KEY (way_id, idx)
        )",
    ),
    (
        "index node_ways by node",
        "CREATE INDEX IF NOT EXISTS node_ways_node ON node_ways (node_id)",
    ),
    (
        "create coverage",
        "CREATE TABLE IF NOT EXISTS coverage (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recorded_at INTEGER NOT NULL,
            polygon TEXT NOT NULL
        )",
    ),
];

/// Apply every schema step inside one transaction.
pub(crate) fn apply(connection: &mut Connection) -> Result<(), (&'static str, rusqlite::Error)> {
    let transaction = connection
        .transaction()
        .map_err(|source| ("begin schema transaction", source))?;
    for (name, sql) in SCHEMA_STEPS {
        transaction
            .execute_batch(sql)
            .map_err(|source| (*name, source))?;
    }
    transaction
        .commit()
        .map_err(|source| ("commit schema transaction", source))
}
