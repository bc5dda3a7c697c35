//! `SpatialStore` backed by an embedded SQLite database.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cosm_core::geojson::{
    decode_line_string, decode_multi_polygon, decode_tags, encode_geometry, encode_tags,
};
use cosm_core::geometry::{EARTH_RADIUS_M, nearest_point_on_line};
use cosm_core::{
    CoverageRow, FeatureId, LineFeature, LineGeometryRow, Membership, NearestLineRow,
    PointFeature, RawFeatureRow, SpatialStore, StoreError, TagPredicate, TargetNodeRow,
    UpsertSummary,
};
use geo::{
    Area, BooleanOps, BoundingRect, Coord, Euclidean, Geometry, Length, LineString, MultiPolygon,
    Point, Polygon, Rect,
};
use log::{debug, info};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Transaction, params, params_from_iter};
use thiserror::Error;

use super::derived::{casing, estimate_width};
use super::{fs, schema, statements};

/// Rows examined by one derived-geometry pass unless configured otherwise.
pub const DEFAULT_DERIVED_BATCH: usize = 512;

/// Uncovered pieces thinner than this, in degrees, are left unfetched.
///
/// Union and difference of lon/lat rectangles leave slivers around
/// `1e-10` degrees wide along shared edges.
pub const COVERAGE_TOLERANCE_DEG: f64 = 1.0e-9;

const NEAREST_START_DEG: f64 = 0.001;
const NEAREST_MAX_DEG: f64 = 1.0;

/// Options for [`SqliteSpatialStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Rows examined per step of a derived-geometry pass.
    pub derived_batch: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            derived_batch: DEFAULT_DERIVED_BATCH,
        }
    }
}

impl StoreOptions {
    /// Set the derived-geometry batch size; zero is raised to one.
    #[must_use]
    pub fn with_derived_batch(mut self, batch: usize) -> Self {
        self.derived_batch = batch.max(1);
        self
    }
}

/// Errors raised while opening a [`SqliteSpatialStore`].
#[derive(Debug, Error)]
pub enum OpenStoreError {
    /// Creating the database's parent directory failed.
    #[error("failed to create parent directory for {path}")]
    CreateDirectory {
        /// Database path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path}")]
    Open {
        /// Database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A schema step failed.
    #[error("schema step `{step}` failed")]
    Schema {
        /// Step name.
        step: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Preparing a statement failed.
    #[error("failed to prepare statement")]
    Prepare {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
}

/// Spatial store over one SQLite connection.
///
/// Every call runs on Tokio's blocking pool. Statements are prepared into the
/// connection's statement cache when the store opens and released by
/// [`SpatialStore::close`].
#[derive(Debug, Clone)]
pub struct SqliteSpatialStore {
    connection: Arc<Mutex<Option<Connection>>>,
    options: StoreOptions,
}

impl SqliteSpatialStore {
    /// Open or create a database file, creating parent directories.
    pub fn open(path: &Utf8Path, options: StoreOptions) -> Result<Self, OpenStoreError> {
        fs::ensure_parent_dir(path).map_err(|source| OpenStoreError::CreateDirectory {
            path: path.to_path_buf(),
            source,
        })?;
        let connection =
            Connection::open(path.as_std_path()).map_err(|source| OpenStoreError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        info!("Opened replica database at {path}");
        Self::from_connection(connection, options)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(options: StoreOptions) -> Result<Self, OpenStoreError> {
        let connection = Connection::open_in_memory().map_err(|source| OpenStoreError::Open {
            path: Utf8PathBuf::from(":memory:"),
            source,
        })?;
        Self::from_connection(connection, options)
    }

    fn from_connection(
        mut connection: Connection,
        options: StoreOptions,
    ) -> Result<Self, OpenStoreError> {
        schema::apply(&mut connection)
            .map_err(|(step, source)| OpenStoreError::Schema { step, source })?;
        connection.set_prepared_statement_cache_capacity(statements::ALL.len() * 2);
        for sql in statements::ALL {
            connection
                .prepare_cached(sql)
                .map_err(|source| OpenStoreError::Prepare { source })?;
        }
        Ok(Self {
            connection: Arc::new(Mutex::new(Some(connection))),
            options,
        })
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let mut guard = connection.lock().map_err(|_| StoreError::Join {
                message: "connection lock poisoned".to_owned(),
            })?;
            let connection = guard.as_mut().ok_or(StoreError::Closed)?;
            f(connection)
        })
        .await
        .map_err(|err| StoreError::Join {
            message: err.to_string(),
        })?
    }
}

fn db(statement: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |source| StoreError::database(statement, source)
}

fn to_sql_int(statement: &'static str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::MalformedRow {
        statement,
        message: format!("{value} exceeds the SQLite integer range"),
    })
}

fn from_sql_int(statement: &'static str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::MalformedRow {
        statement,
        message: format!("unexpected negative value {value}"),
    })
}

fn from_sql_index(statement: &'static str, value: i64) -> Result<usize, StoreError> {
    usize::try_from(value).map_err(|_| StoreError::MalformedRow {
        statement,
        message: format!("invalid vertex index {value}"),
    })
}

fn latest_coverage(connection: &Connection) -> Result<Option<MultiPolygon<f64>>, StoreError> {
    let text: Option<String> = connection
        .prepare_cached(statements::LATEST_COVERAGE)
        .and_then(|mut stmt| stmt.query_row([], |row| row.get(0)).optional())
        .map_err(db("latest coverage"))?;
    text.map(|t| decode_multi_polygon(&t).map_err(StoreError::from))
        .transpose()
}

/// Twice the area over the perimeter: the width of a thin strip.
pub(super) fn is_sliver(polygon: &Polygon<f64>) -> bool {
    let perimeter = Euclidean.length(polygon.exterior());
    perimeter <= 0.0 || 2.0 * polygon.unsigned_area() / perimeter < COVERAGE_TOLERANCE_DEG
}

fn without_slivers(remainder: MultiPolygon<f64>) -> MultiPolygon<f64> {
    remainder
        .into_iter()
        .filter(|polygon| !is_sliver(polygon))
        .collect()
}

fn node_position(tx: &Transaction<'_>, id: i64) -> Result<Option<Coord<f64>>, StoreError> {
    tx.prepare_cached(statements::NODE_POSITION)
        .and_then(|mut stmt| {
            stmt.query_row([id], |row| Ok(Coord { x: row.get(0)?, y: row.get(1)? }))
                .optional()
        })
        .map_err(db("node position"))
}

/// Centreline built from current node positions, if every node is present.
fn build_centreline(
    tx: &Transaction<'_>,
    node_ids: &[FeatureId],
) -> Result<Option<LineString<f64>>, StoreError> {
    let mut coords = Vec::with_capacity(node_ids.len());
    for id in node_ids {
        match node_position(tx, to_sql_int("node position", *id)?)? {
            Some(coord) => coords.push(coord),
            None => return Ok(None),
        }
    }
    Ok(Some(LineString::new(coords)))
}

struct EncodedCentreline {
    text: String,
    extent: Rect<f64>,
}

fn encode_centreline(line: &LineString<f64>) -> Result<Option<EncodedCentreline>, StoreError> {
    let Some(extent) = line.bounding_rect() else {
        return Ok(None);
    };
    let text = encode_geometry(&Geometry::LineString(line.clone()))?;
    Ok(Some(EncodedCentreline { text, extent }))
}

fn upsert_points_tx(tx: &Transaction<'_>, points: &[PointFeature]) -> Result<UpsertSummary, StoreError> {
    let mut summary = UpsertSummary::default();
    for point in points {
        let id = to_sql_int("upsert node", point.id)?;
        let previous = node_position(tx, id)?;
        let version = to_sql_int("upsert node", point.version)?;
        let tags = encode_tags(&point.tags)?;
        tx.prepare_cached(statements::UPSERT_NODE)
            .and_then(|mut stmt| {
                stmt.execute(params![
                    id,
                    point.position.x,
                    point.position.y,
                    version,
                    tags,
                    point.observed_at,
                ])
            })
            .map_err(db("upsert node"))?;
        summary.rows += 1;
        if previous.is_some_and(|p| p != point.position) {
            summary.geometry_changed += 1;
            tx.prepare_cached(statements::MARK_NODE_WAYS_DIRTY)
                .and_then(|mut stmt| stmt.execute([id]))
                .map_err(db("mark node ways dirty"))?;
        }
    }
    Ok(summary)
}

fn upsert_lines_tx(tx: &Transaction<'_>, lines: &[LineFeature]) -> Result<UpsertSummary, StoreError> {
    let mut summary = UpsertSummary::default();
    for line in lines {
        let id = to_sql_int("upsert way", line.id)?;
        let previous: Option<(Option<String>, i64)> = tx
            .prepare_cached(statements::WAY_CENTRELINE)
            .and_then(|mut stmt| {
                stmt.query_row([id], |row| Ok((row.get(0)?, row.get(1)?)))
                    .optional()
            })
            .map_err(db("way centreline"))?;
        let centreline = match build_centreline(tx, &line.node_ids)? {
            Some(built) => encode_centreline(&built)?,
            None => None,
        };
        let new_text = centreline.as_ref().map(|c| c.text.as_str());
        let revision = match &previous {
            None => 1,
            Some((old, rev)) if old.as_deref() == new_text => *rev,
            Some((_, rev)) => rev + 1,
        };
        if previous.as_ref().is_some_and(|(old, _)| old.as_deref() != new_text) {
            summary.geometry_changed += 1;
        }
        let node_ids = serde_json::to_string(&line.node_ids).map_err(|err| {
            StoreError::MalformedRow {
                statement: "upsert way",
                message: err.to_string(),
            }
        })?;
        let version = to_sql_int("upsert way", line.version)?;
        let tags = encode_tags(&line.tags)?;
        let extent = centreline.as_ref().map(|c| c.extent);
        tx.prepare_cached(statements::UPSERT_WAY)
            .and_then(|mut stmt| {
                stmt.execute(params![
                    id,
                    node_ids,
                    version,
                    tags,
                    line.observed_at,
                    new_text,
                    extent.map(|e| e.min().x),
                    extent.map(|e| e.min().y),
                    extent.map(|e| e.max().x),
                    extent.map(|e| e.max().y),
                    revision,
                    i64::from(centreline.is_none()),
                ])
            })
            .map_err(db("upsert way"))?;
        summary.rows += 1;
    }
    Ok(summary)
}

fn upsert_memberships_tx(
    tx: &Transaction<'_>,
    memberships: &[Membership],
) -> Result<UpsertSummary, StoreError> {
    let mut cleared = HashSet::new();
    let mut summary = UpsertSummary::default();
    for membership in memberships {
        let way_id = to_sql_int("upsert membership", membership.line_id)?;
        if cleared.insert(way_id) {
            tx.prepare_cached(statements::DELETE_WAY_MEMBERSHIPS)
                .and_then(|mut stmt| stmt.execute([way_id]))
                .map_err(db("delete way memberships"))?;
        }
        let index = i64::try_from(membership.index).map_err(|_| StoreError::MalformedRow {
            statement: "upsert membership",
            message: format!("vertex index {} out of range", membership.index),
        })?;
        let node_id = to_sql_int("upsert membership", membership.node_id)?;
        tx.prepare_cached(statements::INSERT_MEMBERSHIP)
            .and_then(|mut stmt| stmt.execute(params![way_id, index, node_id]))
            .map_err(db("upsert membership"))?;
        summary.rows += 1;
    }
    Ok(summary)
}

/// Rebuild centrelines of dirty ways whose nodes are all present.
fn rebuild_dirty_centrelines(tx: &Transaction<'_>, batch: i64) -> Result<usize, StoreError> {
    let rows: Vec<(i64, String, Option<String>, i64)> = tx
        .prepare_cached(statements::READY_DIRTY_WAYS)
        .and_then(|mut stmt| {
            stmt.query_map([batch], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect()
        })
        .map_err(db("ready dirty ways"))?;

    let mut changed = 0;
    for (id, node_ids, old, revision) in rows {
        let node_ids: Vec<FeatureId> =
            serde_json::from_str(&node_ids).map_err(|err| StoreError::MalformedRow {
                statement: "ready dirty ways",
                message: err.to_string(),
            })?;
        let encoded = match build_centreline(tx, &node_ids)? {
            Some(line) => encode_centreline(&line)?,
            None => None,
        };
        let new_text = encoded.as_ref().map(|c| c.text.as_str());
        let new_revision = if old.as_deref() == new_text {
            revision
        } else {
            changed += 1;
            revision + 1
        };
        let extent = encoded.as_ref().map(|c| c.extent);
        tx.prepare_cached(statements::REBUILD_CENTRELINE)
            .and_then(|mut stmt| {
                stmt.execute(params![
                    id,
                    new_text,
                    extent.map(|e| e.min().x),
                    extent.map(|e| e.min().y),
                    extent.map(|e| e.max().x),
                    extent.map(|e| e.max().y),
                    new_revision,
                ])
            })
            .map_err(db("rebuild centreline"))?;
    }
    Ok(changed)
}

/// Compute width and casing for lines whose casing is missing or stale.
fn refresh_casings(tx: &Transaction<'_>, batch: i64) -> Result<usize, StoreError> {
    let rows: Vec<(i64, String, String, i64)> = tx
        .prepare_cached(statements::STALE_CASINGS)
        .and_then(|mut stmt| {
            stmt.query_map([batch], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect()
        })
        .map_err(db("stale casings"))?;

    let changed = rows.len();
    for (id, tags, centreline, revision) in rows {
        let tags = decode_tags(&tags)?;
        let line = decode_line_string(&centreline)?;
        let width = estimate_width(&tags);
        let shape = casing(&line, width)
            .map(|shape| encode_geometry(&Geometry::MultiPolygon(shape)))
            .transpose()?;
        tx.prepare_cached(statements::UPDATE_CASING)
            .and_then(|mut stmt| stmt.execute(params![id, width, shape, revision]))
            .map_err(db("update casing"))?;
    }
    Ok(changed)
}

fn feature_rows(
    connection: &Connection,
    statement: &'static str,
    sql: &str,
    bbox: Rect<f64>,
    lines: bool,
) -> Result<Vec<RawFeatureRow>, StoreError> {
    let mut stmt = connection.prepare_cached(sql).map_err(db(statement))?;
    let mut rows = stmt
        .query(params![bbox.min().x, bbox.min().y, bbox.max().x, bbox.max().y])
        .map_err(db(statement))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(db(statement))? {
        let id = from_sql_int(statement, row.get(0).map_err(db(statement))?)?;
        let feature = if lines {
            RawFeatureRow {
                id,
                geometry: row.get(1).map_err(db(statement))?,
                tags: row.get(2).map_err(db(statement))?,
                width: row.get(3).map_err(db(statement))?,
                casing: row.get(4).map_err(db(statement))?,
            }
        } else {
            let position = Point::new(
                row.get::<_, f64>(1).map_err(db(statement))?,
                row.get::<_, f64>(2).map_err(db(statement))?,
            );
            RawFeatureRow {
                id,
                geometry: encode_geometry(&Geometry::Point(position))?,
                tags: row.get(3).map_err(db(statement))?,
                width: None,
                casing: None,
            }
        };
        out.push(feature);
    }
    Ok(out)
}

fn target_nodes_sql(predicate: &TagPredicate) -> String {
    let mut sql = String::from(statements::TARGET_NODES);
    for _ in predicate.clauses() {
        sql.push_str(statements::TARGET_NODE_CLAUSE);
    }
    sql.push_str(statements::TARGET_NODES_ORDER);
    sql
}

fn parse_way_ids(
    statement: &'static str,
    text: Option<&str>,
) -> Result<Vec<FeatureId>, StoreError> {
    let mut ids = text
        .into_iter()
        .flat_map(|list| list.split(','))
        .map(|id| {
            let id: i64 = id.trim().parse().map_err(|_| StoreError::MalformedRow {
                statement,
                message: format!("malformed way id list: {id}"),
            })?;
            from_sql_int(statement, id)
        })
        .collect::<Result<Vec<_>, _>>()?;
    ids.sort_unstable();
    Ok(ids)
}

/// Lower bound, in metres, of the distance to anything outside a box of
/// half-size `delta_deg` around `point`.
fn reach_m(point: Coord<f64>, delta_deg: f64) -> f64 {
    let metres_per_deg = EARTH_RADIUS_M.to_radians();
    let far_lat = (point.y.abs() + delta_deg).min(89.9).to_radians();
    delta_deg * metres_per_deg * far_lat.cos()
}

fn nearest_lines_blocking(
    connection: &Connection,
    point: Coord<f64>,
    limit: usize,
) -> Result<Vec<NearestLineRow>, StoreError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let total: i64 = connection
        .prepare_cached(statements::COUNT_WAYS)
        .and_then(|mut stmt| stmt.query_row([], |row| row.get(0)))
        .map_err(db("count ways"))?;
    let total = from_sql_int("count ways", total)?;
    let mut delta = NEAREST_START_DEG;
    loop {
        let window = Rect::new(
            Coord {
                x: point.x - delta,
                y: point.y - delta,
            },
            Coord {
                x: point.x + delta,
                y: point.y + delta,
            },
        );
        let candidates = feature_rows(
            connection,
            "ways in bbox",
            statements::WAYS_IN_BBOX,
            window,
            true,
        )?;
        let mut found = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let line = decode_line_string(&candidate.geometry)?;
            if let Some(nearest) = nearest_point_on_line(&line, point) {
                found.push((candidate.id, nearest));
            }
        }
        found.sort_by(|a, b| {
            a.1.distance_m
                .total_cmp(&b.1.distance_m)
                .then(a.0.cmp(&b.0))
        });
        found.truncate(limit);
        let settled = found.len() == limit
            && found
                .last()
                .is_some_and(|(_, n)| n.distance_m <= reach_m(point, delta));
        let exhausted = u64::try_from(candidates.len()).unwrap_or(u64::MAX) >= total;
        if settled || exhausted || delta >= NEAREST_MAX_DEG {
            debug!(
                "Nearest lines: point=({}, {}), window={delta}, candidates={}",
                point.x,
                point.y,
                candidates.len()
            );
            return found
                .into_iter()
                .map(|(line_id, nearest)| {
                    Ok(NearestLineRow {
                        line_id,
                        distance_m: nearest.distance_m,
                        index: nearest.index,
                        location_m: nearest.location_m,
                        point: encode_geometry(&Geometry::Point(Point(nearest.point)))?,
                    })
                })
                .collect();
        }
        delta *= 2.0;
    }
}

#[async_trait]
impl SpatialStore for SqliteSpatialStore {
    async fn uncovered_remainder(
        &self,
        requested: &Rect<f64>,
    ) -> Result<Option<String>, StoreError> {
        let requested = *requested;
        self.with_connection(move |connection| {
            let wanted = MultiPolygon::new(vec![requested.to_polygon()]);
            let remainder = match latest_coverage(connection)? {
                Some(covered) => without_slivers(wanted.difference(&covered)),
                None => wanted,
            };
            if remainder.0.is_empty() {
                return Ok(None);
            }
            Ok(Some(encode_geometry(&Geometry::MultiPolygon(remainder))?))
        })
        .await
    }

    async fn record_coverage(&self, fetched: &Rect<f64>, recorded_at: i64) -> Result<(), StoreError> {
        let fetched = MultiPolygon::new(vec![fetched.to_polygon()]);
        self.with_connection(move |connection| {
            let union = match latest_coverage(connection)? {
                Some(covered) => covered.union(&fetched),
                None => fetched,
            };
            let text = encode_geometry(&Geometry::MultiPolygon(union))?;
            connection
                .prepare_cached(statements::INSERT_COVERAGE)
                .and_then(|mut stmt| stmt.execute(params![recorded_at, text]))
                .map_err(db("insert coverage"))?;
            Ok(())
        })
        .await
    }

    async fn coverage(&self) -> Result<Vec<CoverageRow>, StoreError> {
        self.with_connection(|connection| {
            connection
                .prepare_cached(statements::ALL_COVERAGE)
                .and_then(|mut stmt| {
                    stmt.query_map([], |row| {
                        Ok(CoverageRow {
                            recorded_at: row.get(0)?,
                            polygon: row.get(1)?,
                        })
                    })?
                    .collect()
                })
                .map_err(db("all coverage"))
        })
        .await
    }

    async fn upsert_points(&self, points: &[PointFeature]) -> Result<UpsertSummary, StoreError> {
        let points = points.to_vec();
        self.with_connection(move |connection| {
            let tx = connection.transaction().map_err(db("begin upsert nodes"))?;
            let summary = upsert_points_tx(&tx, &points)?;
            tx.commit().map_err(db("commit upsert nodes"))?;
            Ok(summary)
        })
        .await
    }

    async fn upsert_lines(&self, lines: &[LineFeature]) -> Result<UpsertSummary, StoreError> {
        let lines = lines.to_vec();
        self.with_connection(move |connection| {
            let tx = connection.transaction().map_err(db("begin upsert ways"))?;
            let summary = upsert_lines_tx(&tx, &lines)?;
            tx.commit().map_err(db("commit upsert ways"))?;
            Ok(summary)
        })
        .await
    }

    async fn upsert_memberships(
        &self,
        memberships: &[Membership],
    ) -> Result<UpsertSummary, StoreError> {
        let memberships = memberships.to_vec();
        self.with_connection(move |connection| {
            let tx = connection
                .transaction()
                .map_err(db("begin upsert memberships"))?;
            let summary = upsert_memberships_tx(&tx, &memberships)?;
            tx.commit().map_err(db("commit upsert memberships"))?;
            Ok(summary)
        })
        .await
    }

    async fn compute_missing_derived_geometry(&self) -> Result<usize, StoreError> {
        let batch = i64::try_from(self.options.derived_batch).unwrap_or(i64::MAX);
        self.with_connection(move |connection| {
            let tx = connection.transaction().map_err(db("begin derived pass"))?;
            let centrelines = rebuild_dirty_centrelines(&tx, batch)?;
            let casings = refresh_casings(&tx, batch)?;
            tx.commit().map_err(db("commit derived pass"))?;
            debug!("Derived pass: centrelines={centrelines}, casings={casings}");
            Ok(centrelines + casings)
        })
        .await
    }

    async fn points_in_bbox(&self, bbox: &Rect<f64>) -> Result<Vec<RawFeatureRow>, StoreError> {
        let bbox = *bbox;
        self.with_connection(move |connection| {
            feature_rows(connection, "nodes in bbox", statements::NODES_IN_BBOX, bbox, false)
        })
        .await
    }

    async fn lines_in_bbox(&self, bbox: &Rect<f64>) -> Result<Vec<RawFeatureRow>, StoreError> {
        let bbox = *bbox;
        self.with_connection(move |connection| {
            feature_rows(connection, "ways in bbox", statements::WAYS_IN_BBOX, bbox, true)
        })
        .await
    }

    async fn nearest_lines(
        &self,
        point: Coord<f64>,
        limit: usize,
    ) -> Result<Vec<NearestLineRow>, StoreError> {
        self.with_connection(move |connection| nearest_lines_blocking(connection, point, limit))
            .await
    }

    async fn find_target_nodes(
        &self,
        predicate: &TagPredicate,
        bbox: &Rect<f64>,
    ) -> Result<Vec<TargetNodeRow>, StoreError> {
        let predicate = predicate.clone();
        let bbox = *bbox;
        self.with_connection(move |connection| {
            const STATEMENT: &str = "target nodes";
            let mut values = vec![
                Value::Real(bbox.min().x),
                Value::Real(bbox.min().y),
                Value::Real(bbox.max().x),
                Value::Real(bbox.max().y),
            ];
            for (key, value) in predicate.clauses() {
                values.push(Value::Text(key.clone()));
                values.push(Value::Text(value.clone()));
            }
            let mut stmt = connection
                .prepare_cached(&target_nodes_sql(&predicate))
                .map_err(db(STATEMENT))?;
            let rows: Vec<(i64, f64, f64, String, i64, Option<String>)> = stmt
                .query_map(params_from_iter(values), |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })
                .and_then(|rows| rows.collect())
                .map_err(db(STATEMENT))?;

            rows.into_iter()
                .map(|(id, lon, lat, tags, version, way_ids)| {
                    Ok(TargetNodeRow {
                        id: from_sql_int(STATEMENT, id)?,
                        point: encode_geometry(&Geometry::Point(Point::new(lon, lat)))?,
                        tags,
                        version: from_sql_int(STATEMENT, version)?,
                        line_ids: parse_way_ids(STATEMENT, way_ids.as_deref())?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn line_geometry(&self, line_id: FeatureId) -> Result<Option<LineGeometryRow>, StoreError> {
        self.with_connection(move |connection| {
            let id = to_sql_int("way centreline", line_id)?;
            let centreline: Option<Option<String>> = connection
                .prepare_cached(statements::WAY_CENTRELINE)
                .and_then(|mut stmt| stmt.query_row([id], |row| row.get(0)).optional())
                .map_err(db("way centreline"))?;
            let Some(Some(centreline)) = centreline else {
                return Ok(None);
            };
            let indices: Vec<i64> = connection
                .prepare_cached(statements::WAY_INTERSECTIONS)
                .and_then(|mut stmt| stmt.query_map([id], |row| row.get(0))?.collect())
                .map_err(db("way intersections"))?;
            let intersections = indices
                .into_iter()
                .map(|ix| from_sql_index("way intersections", ix))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(LineGeometryRow {
                line_id,
                centreline,
                intersections,
            }))
        })
        .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let mut guard = connection.lock().map_err(|_| StoreError::Join {
                message: "connection lock poisoned".to_owned(),
            })?;
            let Some(connection) = guard.take() else {
                return Ok(());
            };
            connection.flush_prepared_statement_cache();
            connection
                .close()
                .map_err(|(_, source)| StoreError::database("close", source))?;
            info!("Closed replica database");
            Ok(())
        })
        .await
        .map_err(|err| StoreError::Join {
            message: err.to_string(),
        })?
    }
}
