//! Local spatial replica engine.
//!
//! A [`Replica`] keeps a spatial store populated for a sliding viewport and
//! answers the interactive queries used to place annotations:
//!
//! - [`SyncOrchestrator`] fetches only what the coverage log is missing and
//!   deduplicates identical in-flight viewports.
//! - [`Maintainer`] drives derived line geometry to a fixed point, one
//!   invocation at a time.
//! - [`QueryEngine`] serves render, nearest-line, target-node and
//!   orientation queries.
//!
//! All components share one [`StatementSlot`], so a replica can be built
//! before its store is opened and attached later.

pub mod coverage;
pub mod deferred;
pub mod error;
pub mod maintainer;
pub mod query;
pub mod replica;
pub mod single_flight;
pub mod sync;
#[doc(hidden)]
pub mod test_support;

pub use coverage::CoverageTracker;
pub use deferred::{Readiness, StatementSlot};
pub use error::ReplicaError;
pub use maintainer::{Maintainer, PassReport};
pub use query::{FeatureCursor, LineGeometry, NearestLine, QueryEngine, RenderResult, TargetNode};
pub use replica::{
    DEFAULT_NEAREST_LIMIT, Placement, Replica, ReplicaConfig, Selection, TapSelection,
    ViewportUpdate,
};
pub use single_flight::SingleFlight;
pub use sync::{DEFAULT_AREA_FACTOR, SyncConfig, SyncOrchestrator, SyncOutcome};
