//! Coverage tracking: which parts of the map have already been fetched.

use std::sync::Arc;

use cosm_core::CoverageRecord;
use cosm_core::geojson::decode_multi_polygon;
use geo::{MultiPolygon, Rect};

use crate::deferred::StatementSlot;
use crate::error::ReplicaError;

/// Read-only view over the coverage log.
#[derive(Debug, Clone)]
pub struct CoverageTracker {
    slot: Arc<StatementSlot>,
}

impl CoverageTracker {
    /// Track coverage through `slot`.
    #[must_use]
    pub const fn new(slot: Arc<StatementSlot>) -> Self {
        Self { slot }
    }

    /// Part of `requested` not yet covered, or `None` when fully covered.
    ///
    /// Computed fresh on every call. A failure must not be read as
    /// "covered"; callers retry instead.
    pub async fn uncovered_remainder(
        &self,
        requested: &Rect<f64>,
    ) -> Result<Option<MultiPolygon<f64>>, ReplicaError> {
        let store = self.slot.require("uncovered_remainder")?;
        let Some(text) = store.uncovered_remainder(requested).await? else {
            return Ok(None);
        };
        Ok(Some(decode_multi_polygon(&text)?))
    }

    /// Every coverage record, oldest first.
    pub async fn history(&self) -> Result<Vec<CoverageRecord>, ReplicaError> {
        let store = self.slot.require("coverage")?;
        store
            .coverage()
            .await?
            .into_iter()
            .map(|row| {
                Ok::<_, ReplicaError>(CoverageRecord {
                    recorded_at: row.recorded_at,
                    polygon: decode_multi_polygon(&row.polygon)?,
                })
            })
            .collect()
    }

    /// The latest coverage polygon, if anything has been fetched.
    pub async fn covered(&self) -> Result<Option<MultiPolygon<f64>>, ReplicaError> {
        Ok(self.history().await?.pop().map(|record| record.polygon))
    }
}
