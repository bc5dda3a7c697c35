//! Collaborator doubles for exercising the engine without a network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use cosm_core::{
    CoverageRow, FeatureBatch, FeatureId, FeatureSource, FetchError, LineFeature, LineGeometryRow,
    Membership, NearestLineRow, PointFeature, RawFeatureRow, SpatialStore, StoreError,
    TagPredicate, TargetNodeRow, UpsertSummary,
};
use geo::{Coord, Rect};
use tokio::sync::Notify;

/// An east-west road (10: nodes 1, 2, 3) crossed at its middle vertex by a
/// north-south one (11: nodes 4, 2, 5). Node 4 is tagged as a stop and node 5
/// as a give-way.
#[must_use]
pub fn crossing_batch() -> FeatureBatch {
    FeatureBatch {
        points: vec![
            PointFeature::new(1, Coord { x: 0.0, y: 0.0 }),
            PointFeature::new(2, Coord { x: 0.001, y: 0.0 }),
            PointFeature::new(3, Coord { x: 0.002, y: 0.0 }),
            PointFeature::new(4, Coord { x: 0.001, y: -0.001 }).with_tag("highway", "stop"),
            PointFeature::new(5, Coord { x: 0.001, y: 0.001 }).with_tag("highway", "give_way"),
        ],
        lines: vec![
            LineFeature::new(10, vec![1, 2, 3]).with_tag("highway", "residential"),
            LineFeature::new(11, vec![4, 2, 5]).with_tag("highway", "primary"),
        ],
    }
}

/// Feature source that serves a fixed batch and records every request.
#[derive(Debug, Default)]
pub struct CountingSource {
    batch: FeatureBatch,
    calls: AtomicUsize,
    requests: Mutex<Vec<Rect<f64>>>,
    gate: Option<Arc<Notify>>,
}

impl CountingSource {
    /// Serve `batch` for every request.
    #[must_use]
    pub fn new(batch: FeatureBatch) -> Self {
        Self {
            batch,
            ..Self::default()
        }
    }

    /// Hold every fetch until `gate` is notified.
    #[must_use]
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Fetches started so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requested rectangles, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<Rect<f64>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl FeatureSource for CountingSource {
    async fn fetch_bbox(&self, bbox: &Rect<f64>) -> Result<FeatureBatch, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*bbox);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.batch.clone())
    }
}

/// Feature source that always answers with a fixed status error.
#[derive(Debug, Default)]
pub struct FailingSource {
    calls: AtomicUsize,
}

impl FailingSource {
    /// Fetches attempted so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeatureSource for FailingSource {
    async fn fetch_bbox(&self, _bbox: &Rect<f64>) -> Result<FeatureBatch, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::Status {
            url: "test://map".to_owned(),
            status: 509,
            body: "bandwidth limit exceeded".to_owned(),
        })
    }
}

/// Store wrapper that counts derived passes and their overlap.
pub struct CountingStore {
    inner: Arc<dyn SpatialStore>,
    passes: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl std::fmt::Debug for CountingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingStore")
            .field("passes", &self.derived_passes())
            .field("max_active", &self.max_concurrent_passes())
            .finish_non_exhaustive()
    }
}

impl CountingStore {
    /// Wrap `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn SpatialStore>) -> Self {
        Self {
            inner,
            passes: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Derived passes started so far.
    #[must_use]
    pub fn derived_passes(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }

    /// Largest number of derived passes observed running at once.
    #[must_use]
    pub fn max_concurrent_passes(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpatialStore for CountingStore {
    async fn uncovered_remainder(
        &self,
        requested: &Rect<f64>,
    ) -> Result<Option<String>, StoreError> {
        self.inner.uncovered_remainder(requested).await
    }

    async fn record_coverage(
        &self,
        fetched: &Rect<f64>,
        recorded_at: i64,
    ) -> Result<(), StoreError> {
        self.inner.record_coverage(fetched, recorded_at).await
    }

    async fn coverage(&self) -> Result<Vec<CoverageRow>, StoreError> {
        self.inner.coverage().await
    }

    async fn upsert_points(&self, points: &[PointFeature]) -> Result<UpsertSummary, StoreError> {
        self.inner.upsert_points(points).await
    }

    async fn upsert_lines(&self, lines: &[LineFeature]) -> Result<UpsertSummary, StoreError> {
        self.inner.upsert_lines(lines).await
    }

    async fn upsert_memberships(
        &self,
        memberships: &[Membership],
    ) -> Result<UpsertSummary, StoreError> {
        self.inner.upsert_memberships(memberships).await
    }

    async fn compute_missing_derived_geometry(&self) -> Result<usize, StoreError> {
        self.passes.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let result = self.inner.compute_missing_derived_geometry().await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn points_in_bbox(&self, bbox: &Rect<f64>) -> Result<Vec<RawFeatureRow>, StoreError> {
        self.inner.points_in_bbox(bbox).await
    }

    async fn lines_in_bbox(&self, bbox: &Rect<f64>) -> Result<Vec<RawFeatureRow>, StoreError> {
        self.inner.lines_in_bbox(bbox).await
    }

    async fn nearest_lines(
        &self,
        point: Coord<f64>,
        limit: usize,
    ) -> Result<Vec<NearestLineRow>, StoreError> {
        self.inner.nearest_lines(point, limit).await
    }

    async fn find_target_nodes(
        &self,
        predicate: &TagPredicate,
        bbox: &Rect<f64>,
    ) -> Result<Vec<TargetNodeRow>, StoreError> {
        self.inner.find_target_nodes(predicate, bbox).await
    }

    async fn line_geometry(
        &self,
        line_id: FeatureId,
    ) -> Result<Option<LineGeometryRow>, StoreError> {
        self.inner.line_geometry(line_id).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.close().await
    }
}
