//! Named SQL statements, prepared once when the store opens.

pub(crate) const LATEST_COVERAGE: &str =
    "SELECT polygon FROM coverage ORDER BY id DESC LIMIT 1";

pub(crate) const INSERT_COVERAGE: &str =
    "INSERT INTO coverage (recorded_at, polygon) VALUES (?1, ?2)";

pub(crate) const ALL_COVERAGE: &str = "SELECT recorded_at, polygon FROM coverage ORDER BY id";

pub(crate) const NODE_POSITION: &str = "SELECT lon, lat FROM nodes WHERE id = ?1";

pub(crate) const UPSERT_NODE: &str = "INSERT INTO nodes (id, lon, lat, version, tags, observed_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT (id) DO UPDATE SET
        lon = excluded.lon,
        lat = excluded.lat,
        version = excluded.version,
        tags = excluded.tags,
        observed_at = excluded.observed_at";

pub(crate) const MARK_NODE_WAYS_DIRTY: &str = "UPDATE ways SET dirty = 1
     WHERE id IN (SELECT way_id FROM node_ways WHERE node_id = ?1)";

pub(crate) const WAY_CENTRELINE: &str =
    "SELECT centreline, centreline_rev FROM ways WHERE id = ?1";

pub(crate) const UPSERT_WAY: &str = "INSERT INTO ways (
        id, node_ids, version, tags, observed_at, centreline,
        min_lon, min_lat, max_lon, max_lat, centreline_rev, dirty
     )
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
     ON CONFLICT (id) DO UPDATE SET
        node_ids = excluded.node_ids,
        version = excluded.version,
        tags = excluded.tags,
        observed_at = excluded.observed_at,
        centreline = excluded.centreline,
        min_lon = excluded.min_lon,
        min_lat = excluded.min_lat,
        max_lon = excluded.max_lon,
        max_lat = excluded.max_lat,
        centreline_rev = excluded.centreline_rev,
        dirty = excluded.dirty";

pub(crate) const DELETE_WAY_MEMBERSHIPS: &str = "DELETE FROM node_ways WHERE way_id = ?1";

pub(crate) const INSERT_MEMBERSHIP: &str =
    "INSERT OR REPLACE INTO node_ways (way_id, idx, node_id) VALUES (?1, ?2, ?3)";

/// Dirty ways whose every node is present, so a centreline can be built.
pub(crate) const READY_DIRTY_WAYS: &str = "SELECT w.id, w.node_ids, w.centreline, w.centreline_rev
     FROM ways w
     WHERE w.dirty = 1
       AND NOT EXISTS (
           SELECT 1 FROM json_each(w.node_ids) j
           LEFT JOIN nodes n ON n.id = j.value
           WHERE n.id IS NULL
       )
     LIMIT ?1";

pub(crate) const REBUILD_CENTRELINE: &str = "UPDATE ways SET
        centreline = ?2,
        min_lon = ?3,
        min_lat = ?4,
        max_lon = ?5,
        max_lat = ?6,
        centreline_rev = ?7,
        dirty = 0
     WHERE id = ?1";

pub(crate) const STALE_CASINGS: &str = "SELECT id, tags, centreline, centreline_rev FROM ways
     WHERE centreline IS NOT NULL
       AND dirty = 0
       AND casing_rev IS NOT centreline_rev
     LIMIT ?1";

pub(crate) const UPDATE_CASING: &str =
    "UPDATE ways SET width = ?2, casing = ?3, casing_rev = ?4 WHERE id = ?1";

pub(crate) const NODES_IN_BBOX: &str = "SELECT id, lon, lat, tags, version FROM nodes
     WHERE lon BETWEEN ?1 AND ?3 AND lat BETWEEN ?2 AND ?4
     ORDER BY id";

pub(crate) const WAYS_IN_BBOX: &str = "SELECT id, centreline, tags, width, casing FROM ways
     WHERE centreline IS NOT NULL
       AND max_lon >= ?1 AND min_lon <= ?3
       AND max_lat >= ?2 AND min_lat <= ?4
     ORDER BY id";

/// Nodes in a box with the ways referencing them. One
/// [`TARGET_NODE_CLAUSE`] per tag clause follows, then [`TARGET_NODES_ORDER`].
pub(crate) const TARGET_NODES: &str = "SELECT n.id, n.lon, n.lat, n.tags, n.version,
        (SELECT group_concat(way_id) FROM (
            SELECT DISTINCT way_id FROM node_ways WHERE node_id = n.id ORDER BY way_id
        ))
     FROM nodes n
     WHERE n.lon BETWEEN ?1 AND ?3 AND n.lat BETWEEN ?2 AND ?4";

/// Key and value bind as the next two anonymous parameters.
pub(crate) const TARGET_NODE_CLAUSE: &str =
    " AND EXISTS (SELECT 1 FROM json_each(n.tags) WHERE key = ? AND value = ?)";

pub(crate) const TARGET_NODES_ORDER: &str = " ORDER BY n.id";

pub(crate) const WAY_INTERSECTIONS: &str = "SELECT DISTINCT a.idx FROM node_ways a
     JOIN node_ways b ON b.node_id = a.node_id AND b.way_id != a.way_id
     WHERE a.way_id = ?1
     ORDER BY a.idx";

pub(crate) const COUNT_WAYS: &str = "SELECT COUNT(*) FROM ways WHERE centreline IS NOT NULL";

/// Every statement, warmed into the prepared-statement cache at open.
pub(crate) const ALL: &[&str] = &[
    LATEST_COVERAGE,
    INSERT_COVERAGE,
    ALL_COVERAGE,
    NODE_POSITION,
    UPSERT_NODE,
    MARK_NODE_WAYS_DIRTY,
    WAY_CENTRELINE,
    UPSERT_WAY,
    DELETE_WAY_MEMBERSHIPS,
    INSERT_MEMBERSHIP,
    READY_DIRTY_WAYS,
    REBUILD_CENTRELINE,
    STALE_CASINGS,
    UPDATE_CASING,
    NODES_IN_BBOX,
    WAYS_IN_BBOX,
    WAY_INTERSECTIONS,
    COUNT_WAYS,
];
