//! Turning uncovered viewport area into fetched, stored features.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use cosm_core::bbox::bbox_param;
use cosm_core::{FeatureSource, ViewportKey, area_deg2};
use geo::{BoundingRect, Rect};
use log::{debug, info};

use crate::coverage::CoverageTracker;
use crate::deferred::StatementSlot;
use crate::error::ReplicaError;
use crate::maintainer::Maintainer;
use crate::single_flight::SingleFlight;

/// Default multiplier applied to a viewport's area before comparing it with
/// the source's maximum request area.
pub const DEFAULT_AREA_FACTOR: f64 = 10.0;

/// Sync tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// Largest area the remote source serves in one request, in square
    /// degrees. `None` disables the viewport size guard.
    pub max_area_deg2: Option<f64>,
    /// Viewports whose area times this factor exceeds `max_area_deg2` are
    /// skipped.
    pub area_factor: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_area_deg2: None,
            area_factor: DEFAULT_AREA_FACTOR,
        }
    }
}

impl SyncConfig {
    /// Enable the viewport size guard with the source's maximum area.
    #[must_use]
    pub const fn with_max_area(mut self, max_area_deg2: f64) -> Self {
        self.max_area_deg2 = Some(max_area_deg2);
        self
    }

    /// Set the area multiplier.
    #[must_use]
    pub const fn with_area_factor(mut self, area_factor: f64) -> Self {
        self.area_factor = area_factor;
        self
    }

    fn too_large(&self, viewport: &Rect<f64>) -> Option<f64> {
        let max = self.max_area_deg2?;
        let area = area_deg2(viewport);
        (area * self.area_factor > max).then_some(area)
    }
}

/// What one `ensure_covered` call did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    /// The viewport was already covered; nothing was fetched.
    AlreadyCovered,
    /// The remainder's envelope was fetched and stored.
    Fetched {
        /// Requested and recorded rectangle.
        envelope: Rect<f64>,
        /// Points stored.
        points: usize,
        /// Lines stored.
        lines: usize,
    },
    /// The viewport was too large to request.
    SkippedTooLarge {
        /// Viewport area in square degrees.
        area_deg2: f64,
    },
}

/// Fetches what the coverage log is missing and stores it.
pub struct SyncOrchestrator {
    slot: Arc<StatementSlot>,
    tracker: CoverageTracker,
    source: Arc<dyn FeatureSource>,
    maintainer: Maintainer,
    flights: SingleFlight<ViewportKey, SyncOutcome, ReplicaError>,
    config: SyncConfig,
}

impl fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("slot", &self.slot)
            .field("maintainer", &self.maintainer)
            .field("flights", &self.flights)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Create an orchestrator over a shared store slot.
    #[must_use]
    pub fn new(
        slot: Arc<StatementSlot>,
        source: Arc<dyn FeatureSource>,
        maintainer: Maintainer,
        config: SyncConfig,
    ) -> Self {
        Self {
            tracker: CoverageTracker::new(Arc::clone(&slot)),
            slot,
            source,
            maintainer,
            flights: SingleFlight::new(),
            config,
        }
    }

    /// The coverage tracker this orchestrator consults.
    #[must_use]
    pub const fn tracker(&self) -> &CoverageTracker {
        &self.tracker
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Number of viewports currently being synced.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    /// Make sure everything inside `viewport` is stored locally.
    ///
    /// Concurrent calls for the same viewport share one run. Coverage is
    /// recorded only after every upsert succeeded, so a failed call leaves
    /// the coverage log untouched and a retry repeats the same fetch. The
    /// derived-geometry maintainer is triggered but not awaited.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::Fetch`] or [`ReplicaError::Store`] from the failing
    /// step; [`ReplicaError::StaleStatement`] before a store is attached.
    pub async fn ensure_covered(&self, viewport: &Rect<f64>) -> Result<SyncOutcome, ReplicaError> {
        if let Some(area_deg2) = self.config.too_large(viewport) {
            info!(
                "Skipped sync: bbox={}, area_deg2={area_deg2}",
                bbox_param(viewport)
            );
            return Ok(SyncOutcome::SkippedTooLarge { area_deg2 });
        }
        let key = ViewportKey::from_rect(viewport);
        self.flights
            .run(key, || self.sync(viewport))
            .await
            .map_err(|err| (*err).clone())
    }

    async fn sync(&self, viewport: &Rect<f64>) -> Result<SyncOutcome, ReplicaError> {
        let Some(remainder) = self.tracker.uncovered_remainder(viewport).await? else {
            debug!("Viewport already covered: bbox={}", bbox_param(viewport));
            return Ok(SyncOutcome::AlreadyCovered);
        };
        let Some(envelope) = remainder.bounding_rect() else {
            return Ok(SyncOutcome::AlreadyCovered);
        };

        let batch = self.source.fetch_bbox(&envelope).await?;
        let store = self.slot.require("ensure_covered")?;
        store.upsert_points(&batch.points).await?;
        store.upsert_lines(&batch.lines).await?;
        store.upsert_memberships(&batch.memberships()).await?;
        store.record_coverage(&envelope, unix_now()).await?;

        info!(
            "Synced bbox={}: points={}, lines={}",
            bbox_param(&envelope),
            batch.points.len(),
            batch.lines.len()
        );
        self.maintainer.request_pass();
        Ok(SyncOutcome::Fetched {
            envelope,
            points: batch.points.len(),
            lines: batch.lines.len(),
        })
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingSource, FailingSource};
    use cosm_core::bbox::rect;
    use cosm_core::{FeatureBatch, LineFeature, PointFeature, SpatialStore};
    use cosm_data::{SqliteSpatialStore, StoreOptions};
    use futures_util::future::join_all;
    use geo::{Area, Coord};
    use rstest::{fixture, rstest};
    use tokio::sync::Notify;

    fn batch() -> FeatureBatch {
        FeatureBatch {
            points: vec![
                PointFeature::new(1, Coord { x: 0.1, y: 0.5 }),
                PointFeature::new(2, Coord { x: 0.9, y: 0.5 }),
            ],
            lines: vec![LineFeature::new(3, vec![1, 2]).with_tag("highway", "residential")],
        }
    }

    #[fixture]
    fn slot() -> Arc<StatementSlot> {
        let store =
            SqliteSpatialStore::open_in_memory(StoreOptions::default()).expect("open store");
        let slot = Arc::new(StatementSlot::new());
        slot.install(Arc::new(store)).expect("install");
        slot
    }

    fn orchestrator(slot: &Arc<StatementSlot>, source: Arc<dyn FeatureSource>) -> SyncOrchestrator {
        SyncOrchestrator::new(
            Arc::clone(slot),
            source,
            Maintainer::new(Arc::clone(slot)),
            SyncConfig::default(),
        )
    }

    #[rstest]
    #[tokio::test]
    async fn covered_viewport_is_not_fetched_again(slot: Arc<StatementSlot>) {
        let source = Arc::new(CountingSource::new(batch()));
        let sync = orchestrator(&slot, source.clone());

        let first = sync
            .ensure_covered(&rect(0.0, 0.0, 1.0, 1.0))
            .await
            .expect("first sync");
        assert_eq!(
            first,
            SyncOutcome::Fetched {
                envelope: rect(0.0, 0.0, 1.0, 1.0),
                points: 2,
                lines: 1
            }
        );
        let second = sync
            .ensure_covered(&rect(0.2, 0.2, 0.8, 0.8))
            .await
            .expect("second sync");
        assert_eq!(second, SyncOutcome::AlreadyCovered);
        assert_eq!(source.calls(), 1);
        assert_eq!(source.requests(), vec![rect(0.0, 0.0, 1.0, 1.0)]);
    }

    #[rstest]
    #[tokio::test]
    async fn only_the_remainder_envelope_is_fetched(slot: Arc<StatementSlot>) {
        let source = Arc::new(CountingSource::new(FeatureBatch::default()));
        let sync = orchestrator(&slot, source.clone());
        sync.ensure_covered(&rect(0.0, 0.0, 1.0, 1.0))
            .await
            .expect("first sync");
        sync.ensure_covered(&rect(0.5, 0.0, 2.0, 1.0))
            .await
            .expect("second sync");
        assert_eq!(source.requests()[1], rect(1.0, 0.0, 2.0, 1.0));
    }

    #[rstest]
    #[tokio::test]
    async fn identical_viewports_share_one_fetch(slot: Arc<StatementSlot>) {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(CountingSource::new(batch()).gated(Arc::clone(&gate)));
        let sync = orchestrator(&slot, source.clone());
        let viewport = rect(0.0, 0.0, 1.0, 1.0);

        let callers = join_all((0..4).map(|_| sync.ensure_covered(&viewport)));
        let release = async {
            while source.calls() == 0 {
                tokio::task::yield_now().await;
            }
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
            gate.notify_one();
        };
        let (results, ()) = tokio::join!(callers, release);

        assert_eq!(source.calls(), 1);
        assert!(results.iter().all(|r| matches!(r, Ok(SyncOutcome::Fetched { .. }))));
        assert_eq!(sync.in_flight(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn failed_fetch_records_no_coverage(slot: Arc<StatementSlot>) {
        let source = Arc::new(FailingSource::default());
        let sync = orchestrator(&slot, source.clone());
        let viewport = rect(0.0, 0.0, 1.0, 1.0);

        let err = sync.ensure_covered(&viewport).await.expect_err("fetch fails");
        assert!(matches!(err, ReplicaError::Fetch(_)));
        assert!(sync.tracker().history().await.expect("history").is_empty());

        sync.ensure_covered(&viewport).await.expect_err("retry fails too");
        assert_eq!(source.calls(), 2);
    }

    /// Overlapping city-scale viewports wandering around one district.
    fn pan_sequence() -> Vec<Rect<f64>> {
        (0..40_u32)
            .map(|step| {
                let step = f64::from(step);
                let x = 13.40 + 0.001_1 * (step % 7.0) + 0.000_37 * (step / 7.0).floor();
                let y = 52.51 + 0.001_3 * (step % 5.0) + 0.000_29 * (step / 5.0).floor();
                rect(x, y, x + 0.003_1, y + 0.002_7)
            })
            .collect()
    }

    #[rstest]
    #[tokio::test]
    async fn panning_back_never_refetches(slot: Arc<StatementSlot>) {
        let source = Arc::new(CountingSource::new(FeatureBatch::default()));
        let sync = orchestrator(&slot, source.clone());
        let viewports = pan_sequence();
        for viewport in &viewports {
            sync.ensure_covered(viewport).await.expect("sync");
        }
        let fetched = source.calls();
        assert!(fetched <= viewports.len());

        for viewport in &viewports {
            let outcome = sync.ensure_covered(viewport).await.expect("revisit");
            assert_eq!(outcome, SyncOutcome::AlreadyCovered, "{viewport:?}");
        }
        assert_eq!(source.calls(), fetched);

        let history = sync.tracker().history().await.expect("history");
        assert_eq!(history.len(), fetched);
        for pair in history.windows(2) {
            assert!(pair[1].polygon.unsigned_area() + 1.0e-12 >= pair[0].polygon.unsigned_area());
        }
    }

    #[rstest]
    #[tokio::test]
    async fn large_viewports_are_skipped_when_guarded(slot: Arc<StatementSlot>) {
        let source = Arc::new(CountingSource::new(batch()));
        let sync = SyncOrchestrator::new(
            Arc::clone(&slot),
            source.clone(),
            Maintainer::new(Arc::clone(&slot)),
            SyncConfig::default().with_max_area(0.25),
        );
        let outcome = sync
            .ensure_covered(&rect(0.0, 0.0, 0.5, 0.5))
            .await
            .expect("guarded sync");
        assert_eq!(outcome, SyncOutcome::SkippedTooLarge { area_deg2: 0.25 });
        sync.ensure_covered(&rect(0.0, 0.0, 0.1, 0.1))
            .await
            .expect("small viewport syncs");
        assert_eq!(source.calls(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn sync_without_a_store_is_stale() {
        let slot = Arc::new(StatementSlot::new());
        let sync = orchestrator(&slot, Arc::new(CountingSource::default()));
        let err = sync
            .ensure_covered(&rect(0.0, 0.0, 1.0, 1.0))
            .await
            .expect_err("no store");
        assert!(matches!(err, ReplicaError::StaleStatement { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn fetched_lines_reach_the_store(slot: Arc<StatementSlot>) {
        let sync = orchestrator(&slot, Arc::new(CountingSource::new(batch())));
        sync.ensure_covered(&rect(0.0, 0.0, 1.0, 1.0))
            .await
            .expect("sync");
        let store: Arc<dyn SpatialStore> = slot.require("test").expect("store");
        let geometry = store.line_geometry(3).await.expect("query");
        assert!(geometry.is_some());
    }
}
