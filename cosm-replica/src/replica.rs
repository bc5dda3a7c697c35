//! The engine facade driven by a viewport controller.

use std::sync::Arc;

use cosm_core::orientation::{direction_tag, resolve_direction, sign_angle};
use cosm_core::{
    DerivedPoint, Direction, FeatureId, FeatureSource, NearestOnLine, Orientation, SignKind,
    SpatialStore, Tags, TargetKind,
};
use geo::{Coord, Rect};
use log::{debug, info, warn};

use crate::coverage::CoverageTracker;
use crate::deferred::StatementSlot;
use crate::error::ReplicaError;
use crate::maintainer::{Maintainer, PassReport};
use crate::query::{NearestLine, QueryEngine, RenderResult, TargetNode};
use crate::sync::{SyncConfig, SyncOrchestrator, SyncOutcome};

/// Default number of candidate lines returned for a tap.
pub const DEFAULT_NEAREST_LIMIT: usize = 5;

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplicaConfig {
    /// Sync tuning.
    pub sync: SyncConfig,
    /// Candidate lines considered for a tap.
    pub nearest_limit: usize,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            nearest_limit: DEFAULT_NEAREST_LIMIT,
        }
    }
}

impl ReplicaConfig {
    /// Set the sync tuning.
    #[must_use]
    pub const fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Set the tap candidate limit.
    #[must_use]
    pub const fn with_nearest_limit(mut self, nearest_limit: usize) -> Self {
        self.nearest_limit = nearest_limit;
        self
    }
}

/// Result of a viewport change.
#[derive(Debug)]
pub struct ViewportUpdate {
    /// Outcome of making the viewport covered. Sync failures are reported
    /// here so the render result is still delivered.
    pub sync: Result<SyncOutcome, ReplicaError>,
    /// Render query over the padded viewport.
    pub render: RenderResult,
}

/// The line selected by a tap.
#[derive(Debug, Clone, PartialEq)]
pub struct TapSelection {
    /// Closest line and the projection onto it.
    pub line: NearestLine,
    /// Draggable placement point seeded at the projection.
    pub derived: DerivedPoint,
    /// Bearing and inferred direction at the projection.
    pub orientation: Option<Orientation>,
    /// Every candidate line, closest first, the selection included.
    pub candidates: Vec<NearestLine>,
}

/// Anchor candidates for a sign.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Node or line.
    pub target: TargetKind,
    /// Nodes already tagged the way the sign wants.
    pub candidates: Vec<TargetNode>,
    /// Nodes carrying a commonly mistaken tagging for this sign.
    pub erroneous: Vec<TargetNode>,
}

/// Everything needed to add a sign at a placement point.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Placement point on the line.
    pub derived: DerivedPoint,
    /// Bearing of the line at the placement point.
    pub bearing_deg: f64,
    /// Direction the sign applies to.
    pub direction: Direction,
    /// Facing of the sign, degrees `[0, 360)`.
    pub sign_angle: f64,
    /// Tags for the new sign node.
    pub sign_tags: Tags,
    /// Tags for a new marker node on the line, when the sign wants a node.
    pub marker_tags: Option<Tags>,
}

/// One open replica: a feature source, a store slot and the components
/// sharing it.
#[derive(Debug)]
pub struct Replica {
    slot: Arc<StatementSlot>,
    maintainer: Maintainer,
    sync: SyncOrchestrator,
    queries: QueryEngine,
    config: ReplicaConfig,
}

impl Replica {
    /// Create a replica with no store attached.
    ///
    /// Derived-geometry requests made before [`Replica::attach`] are
    /// replayed once a store arrives.
    #[must_use]
    pub fn new(source: Arc<dyn FeatureSource>, config: ReplicaConfig) -> Self {
        let slot = Arc::new(StatementSlot::new());
        let maintainer = Maintainer::new(Arc::clone(&slot));
        let sync = SyncOrchestrator::new(
            Arc::clone(&slot),
            source,
            maintainer.clone(),
            config.sync,
        );
        Self {
            queries: QueryEngine::new(Arc::clone(&slot)),
            slot,
            maintainer,
            sync,
            config,
        }
    }

    /// Attach the spatial store.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::AlreadyAttached`] on a second attach, or
    /// [`ReplicaError::StaleStatement`] after shutdown.
    pub fn attach(&self, store: Arc<dyn SpatialStore>) -> Result<(), ReplicaError> {
        self.slot.install(store)?;
        info!("Spatial store attached");
        Ok(())
    }

    /// Whether a store is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.slot.is_ready()
    }

    /// Detach and close the store. Later calls fail as stale; calling twice
    /// is harmless.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::Store`] if the store fails to close.
    pub async fn shutdown(&self) -> Result<(), ReplicaError> {
        if let Some(store) = self.slot.close() {
            store.close().await?;
            info!("Spatial store closed");
        }
        Ok(())
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    /// Coverage log view.
    #[must_use]
    pub const fn coverage(&self) -> &CoverageTracker {
        self.sync.tracker()
    }

    /// Sync orchestrator.
    #[must_use]
    pub const fn sync(&self) -> &SyncOrchestrator {
        &self.sync
    }

    /// Query engine.
    #[must_use]
    pub const fn queries(&self) -> &QueryEngine {
        &self.queries
    }

    /// Derived-geometry maintainer.
    #[must_use]
    pub const fn maintainer(&self) -> &Maintainer {
        &self.maintainer
    }

    /// Run derived geometry to a fixed point.
    ///
    /// # Errors
    ///
    /// See [`Maintainer::recompute_derived_geometry`].
    pub async fn recompute_derived_geometry(&self) -> Result<PassReport, ReplicaError> {
        self.maintainer.recompute_derived_geometry().await
    }

    /// Make `viewport` covered, then render around it.
    ///
    /// # Errors
    ///
    /// Only render failures; sync failures travel in
    /// [`ViewportUpdate::sync`].
    pub async fn on_viewport_changed(
        &self,
        viewport: &Rect<f64>,
    ) -> Result<ViewportUpdate, ReplicaError> {
        let sync = self.sync.ensure_covered(viewport).await;
        if let Err(err) = &sync {
            warn!("Viewport sync failed: {err}");
        }
        let render = self.queries.features_in_viewport(viewport).await?;
        Ok(ViewportUpdate { sync, render })
    }

    /// Select the line nearest a tapped point.
    ///
    /// `None` when no line is stored.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::StaleStatement`] without a store, or
    /// [`ReplicaError::Store`] if a statement fails.
    pub async fn on_tap_near(&self, point: Coord<f64>) -> Result<Option<TapSelection>, ReplicaError> {
        let candidates = self
            .queries
            .nearest_lines(point, self.config.nearest_limit)
            .await?;
        let Some(line) = candidates.first().copied() else {
            debug!("Tap at {point:?} found no line");
            return Ok(None);
        };
        let orientation = self
            .queries
            .angle_and_direction(line.line_id, &line.nearest)
            .await?;
        Ok(Some(TapSelection {
            line,
            derived: self.queries.derived_point(line.line_id, &line.nearest),
            orientation,
            candidates,
        }))
    }

    /// Find existing anchor nodes for `sign` inside `bbox`.
    ///
    /// Signs annotating lines, and signs without a node predicate, have no
    /// candidates.
    ///
    /// # Errors
    ///
    /// As for [`QueryEngine::find_targets`].
    pub async fn on_select_feature(
        &self,
        sign: &SignKind,
        bbox: &Rect<f64>,
    ) -> Result<Selection, ReplicaError> {
        let target = sign.wants();
        if target.kind == TargetKind::Line || target.predicate.is_empty() {
            return Ok(Selection {
                target: target.kind,
                candidates: Vec::new(),
                erroneous: Vec::new(),
            });
        }
        let candidates = self.queries.find_targets(&target.predicate, bbox).await?;
        let erroneous = match &target.erroneous_alternative {
            Some(alternative) => self.queries.find_targets(alternative, bbox).await?,
            None => Vec::new(),
        };
        Ok(Selection {
            target: target.kind,
            candidates,
            erroneous,
        })
    }

    /// Tags and placement for adding `sign` beside `line_id` at `nearest`.
    ///
    /// The direction is the user's choice when given, otherwise the one
    /// inferred from the line's intersections, otherwise forward.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::UnknownLine`] or [`ReplicaError::DegenerateLine`]
    /// when the line has no usable centreline.
    pub async fn place_sign(
        &self,
        sign: &SignKind,
        line_id: FeatureId,
        nearest: &NearestOnLine,
        user_direction: Option<Direction>,
    ) -> Result<Placement, ReplicaError> {
        let orientation = self
            .queries
            .angle_and_direction(line_id, nearest)
            .await?
            .ok_or(ReplicaError::DegenerateLine { id: line_id })?;
        let direction = resolve_direction(None, user_direction, orientation.direction);
        let angle = sign_angle(orientation.bearing_deg, direction);

        let mut sign_tags = sign.tags();
        sign_tags.insert("direction".into(), direction_tag(angle));

        let target = sign.wants();
        let marker_tags = (target.kind == TargetKind::Node && !target.predicate.is_empty()).then(|| {
            let mut tags: Tags = target
                .predicate
                .clauses()
                .iter()
                .cloned()
                .collect();
            tags.insert("direction".into(), direction.as_tag().into());
            tags
        });

        Ok(Placement {
            derived: self.queries.derived_point(line_id, nearest),
            bearing_deg: orientation.bearing_deg,
            direction,
            sign_angle: angle,
            sign_tags,
            marker_tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingSource, crossing_batch as crossing};
    use cosm_core::bbox::rect;
    use cosm_data::{SqliteSpatialStore, StoreOptions};
    use rstest::{fixture, rstest};

    #[fixture]
    fn replica() -> Replica {
        let replica = Replica::new(
            Arc::new(CountingSource::new(crossing())),
            ReplicaConfig::default(),
        );
        let store =
            SqliteSpatialStore::open_in_memory(StoreOptions::default()).expect("open store");
        replica.attach(Arc::new(store)).expect("attach");
        replica
    }

    fn area() -> Rect<f64> {
        rect(-0.01, -0.01, 0.01, 0.01)
    }

    #[rstest]
    #[tokio::test]
    async fn viewport_change_syncs_and_renders(replica: Replica) {
        let update = replica.on_viewport_changed(&area()).await.expect("update");
        assert!(matches!(update.sync, Ok(SyncOutcome::Fetched { points: 5, lines: 2, .. })));
        assert_eq!(update.render.points.len(), 5);
        assert_eq!(update.render.lines.len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn render_before_attach_is_empty_not_an_error() {
        let replica = Replica::new(
            Arc::new(CountingSource::new(crossing())),
            ReplicaConfig::default(),
        );
        let update = replica.on_viewport_changed(&area()).await.expect("update");
        assert!(matches!(update.sync, Err(ReplicaError::StaleStatement { .. })));
        assert!(update.render.points.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn tap_selects_the_closest_line(replica: Replica) {
        replica.sync().ensure_covered(&area()).await.expect("sync");
        let selection = replica
            .on_tap_near(Coord { x: 0.0004, y: 0.00005 })
            .await
            .expect("tap")
            .expect("a line is near");
        assert_eq!(selection.line.line_id, 10);
        assert_eq!(selection.derived.line_id, 10);
        assert_eq!(selection.candidates.len(), 2);
        let orientation = selection.orientation.expect("bearing");
        assert_eq!(orientation.direction, Some(Direction::Forward));
    }

    #[rstest]
    #[tokio::test]
    async fn tap_on_an_empty_replica_selects_nothing(replica: Replica) {
        let selection = replica
            .on_tap_near(Coord { x: 0.0, y: 0.0 })
            .await
            .expect("tap");
        assert!(selection.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn stop_selection_lists_mistaken_give_ways(replica: Replica) {
        replica.sync().ensure_covered(&area()).await.expect("sync");
        let selection = replica
            .on_select_feature(&SignKind::Stop, &area())
            .await
            .expect("select");
        assert_eq!(selection.target, TargetKind::Node);
        let ids: Vec<_> = selection.candidates.iter().map(|t| t.point.id).collect();
        assert_eq!(ids, vec![4]);
        let mistaken: Vec<_> = selection.erroneous.iter().map(|t| t.point.id).collect();
        assert_eq!(mistaken, vec![5]);
    }

    #[rstest]
    #[tokio::test]
    async fn line_signs_search_no_nodes(replica: Replica) {
        replica.sync().ensure_covered(&area()).await.expect("sync");
        let sign: SignKind = "maxspeed:30".parse().expect("sign");
        let selection = replica
            .on_select_feature(&sign, &area())
            .await
            .expect("select");
        assert_eq!(selection.target, TargetKind::Line);
        assert!(selection.candidates.is_empty());
    }

    #[rstest]
    #[case(None, Direction::Forward, "180")]
    #[case(Some(Direction::Backward), Direction::Backward, "0")]
    #[tokio::test]
    async fn placement_tags_follow_the_direction(
        replica: Replica,
        #[case] user: Option<Direction>,
        #[case] expected: Direction,
        #[case] facing: &str,
    ) {
        replica.sync().ensure_covered(&area()).await.expect("sync");
        let nearest = replica
            .queries()
            .project_onto_line(10, Coord { x: 0.0004, y: 0.0 })
            .await
            .expect("projection");
        let placement = replica
            .place_sign(&SignKind::Stop, 10, &nearest, user)
            .await
            .expect("placement");

        assert_eq!(placement.direction, expected);
        assert_eq!(
            placement.sign_tags.get("traffic_sign").map(String::as_str),
            Some("stop")
        );
        assert_eq!(
            placement.sign_tags.get("direction").map(String::as_str),
            Some(facing)
        );
        let marker = placement.marker_tags.expect("stop wants a node");
        assert_eq!(marker.get("highway").map(String::as_str), Some("stop"));
        assert_eq!(
            marker.get("direction").map(String::as_str),
            Some(expected.as_tag())
        );
    }

    #[rstest]
    #[tokio::test]
    async fn shutdown_makes_queries_stale(replica: Replica) {
        replica.shutdown().await.expect("shutdown");
        replica.shutdown().await.expect("second shutdown");
        let err = replica
            .on_tap_near(Coord { x: 0.0, y: 0.0 })
            .await
            .expect_err("stale");
        assert!(matches!(err, ReplicaError::StaleStatement { .. }));
        assert!(!replica.is_attached());
    }
}
