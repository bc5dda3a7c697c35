//! Behavioural tests for the replica facade over a real SQLite store.

use std::cell::RefCell;
use std::sync::Arc;

use cosm_core::{BBoxArg, FeatureSource};
use cosm_data::{SqliteSpatialStore, StoreOptions};
use cosm_replica::test_support::{CountingSource, FailingSource, crossing_batch};
use cosm_replica::{PassReport, Replica, ReplicaConfig, ReplicaError, SyncOutcome};
use futures_util::future::join_all;
use geo::{Area, Contains, Rect};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tokio::runtime::Runtime;
use tokio::sync::Notify;

struct ReplicaWorld {
    runtime: Runtime,
    replica: RefCell<Option<Replica>>,
    counting: RefCell<Option<Arc<CountingSource>>>,
    gate: Arc<Notify>,
    viewports: RefCell<Vec<Rect<f64>>>,
    syncs: RefCell<Vec<Result<SyncOutcome, ReplicaError>>>,
    window: RefCell<Option<Rect<f64>>>,
    pass: RefCell<Option<PassReport>>,
}

impl ReplicaWorld {
    fn attach(&self, source: Arc<dyn FeatureSource>) {
        let replica = Replica::new(source, ReplicaConfig::default());
        let store =
            SqliteSpatialStore::open_in_memory(StoreOptions::default()).expect("open store");
        replica.attach(Arc::new(store)).expect("attach store");
        self.replica.replace(Some(replica));
    }

    fn with_replica<T>(&self, run: impl FnOnce(&Replica) -> T) -> T {
        let borrowed = self.replica.borrow();
        run(borrowed.as_ref().expect("replica must be initialised"))
    }

    fn counting(&self) -> Arc<CountingSource> {
        self.counting
            .borrow()
            .clone()
            .expect("counting source must be initialised")
    }
}

#[fixture]
fn world() -> ReplicaWorld {
    ReplicaWorld {
        runtime: tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("build runtime"),
        replica: RefCell::new(None),
        counting: RefCell::new(None),
        gate: Arc::new(Notify::new()),
        viewports: RefCell::new(Vec::new()),
        syncs: RefCell::new(Vec::new()),
        window: RefCell::new(None),
        pass: RefCell::new(None),
    }
}

fn bbox(text: &str) -> Rect<f64> {
    text.parse::<BBoxArg>().expect("bounding box").0
}

fn assert_rect_eq(found: Rect<f64>, expected: Rect<f64>) {
    let close = |a: f64, b: f64| (a - b).abs() < 1.0e-9;
    assert!(
        close(found.min().x, expected.min().x)
            && close(found.min().y, expected.min().y)
            && close(found.max().x, expected.max().x)
            && close(found.max().y, expected.max().y),
        "expected {expected:?}, found {found:?}"
    );
}

// --- Given steps ---

#[given("a replica serving the crossing")]
fn serving_crossing(world: &ReplicaWorld) {
    let source = Arc::new(CountingSource::new(crossing_batch()));
    world.counting.replace(Some(Arc::clone(&source)));
    world.attach(source);
}

#[given("a replica whose source is held")]
fn held_source(world: &ReplicaWorld) {
    let source = Arc::new(CountingSource::new(crossing_batch()).gated(Arc::clone(&world.gate)));
    world.counting.replace(Some(Arc::clone(&source)));
    world.attach(source);
}

#[given("a replica whose source fails")]
fn failing_source(world: &ReplicaWorld) {
    world.attach(Arc::new(FailingSource::default()));
}

// --- When steps ---

#[when("the viewport moves to {viewport}")]
fn viewport_moves(world: &ReplicaWorld, viewport: String) {
    let viewport = bbox(&viewport);
    let update = world.with_replica(|replica| {
        world
            .runtime
            .block_on(replica.on_viewport_changed(&viewport))
            .expect("render succeeds")
    });
    world.viewports.borrow_mut().push(viewport);
    world.window.replace(Some(update.render.window));
    world.syncs.borrow_mut().push(update.sync);
}

#[when("{callers} callers request {viewport} at once")]
fn concurrent_callers(world: &ReplicaWorld, callers: usize, viewport: String) {
    let viewport = bbox(&viewport);
    let results = world.with_replica(|replica| {
        world.runtime.block_on(async {
            let requests = join_all((0..callers).map(|_| replica.sync().ensure_covered(&viewport)));
            let release = async {
                for _ in 0..8 {
                    tokio::task::yield_now().await;
                }
                world.gate.notify_one();
            };
            let (results, ()) = tokio::join!(requests, release);
            results
        })
    });
    world.syncs.borrow_mut().extend(results);
}

#[when("derived geometry is recomputed")]
fn recompute(world: &ReplicaWorld) {
    let report = world.with_replica(|replica| {
        world
            .runtime
            .block_on(replica.recompute_derived_geometry())
            .expect("derived pass")
    });
    world.pass.replace(Some(report));
}

// --- Then steps ---

#[then("the source was asked {count} times")]
fn source_calls(world: &ReplicaWorld, count: usize) {
    assert_eq!(world.counting().calls(), count);
}

#[then("the last request covered {expected}")]
fn last_request(world: &ReplicaWorld, expected: String) {
    let requests = world.counting().requests();
    let last = *requests.last().expect("at least one request");
    assert_rect_eq(last, bbox(&expected));
}

#[then("the render window is {expected}")]
fn render_window(world: &ReplicaWorld, expected: String) {
    let window = world.window.borrow().expect("a render ran");
    assert_rect_eq(window, bbox(&expected));
}

#[then("every caller succeeded")]
fn every_caller_succeeded(world: &ReplicaWorld) {
    let syncs = world.syncs.borrow();
    assert!(!syncs.is_empty());
    for outcome in syncs.iter() {
        assert!(outcome.is_ok(), "unexpected {outcome:?}");
    }
}

#[then("the sync failed")]
fn sync_failed(world: &ReplicaWorld) {
    let syncs = world.syncs.borrow();
    let last = syncs.last().expect("a sync ran");
    assert!(matches!(last, Err(ReplicaError::Fetch(_))), "found {last:?}");
}

#[then("no coverage is recorded")]
fn no_coverage(world: &ReplicaWorld) {
    let history = world.with_replica(|replica| {
        world
            .runtime
            .block_on(replica.coverage().history())
            .expect("coverage history")
    });
    assert!(history.is_empty());
}

#[then("the last recompute changed {rows} rows")]
fn recompute_changed(world: &ReplicaWorld, rows: usize) {
    let report = world.pass.borrow().expect("a recompute ran");
    assert_eq!(report.rows_changed, rows);
}

#[then("the covered area never shrinks")]
fn coverage_grows(world: &ReplicaWorld) {
    let history = world.with_replica(|replica| {
        world
            .runtime
            .block_on(replica.coverage().history())
            .expect("coverage history")
    });
    let viewports = world.viewports.borrow();
    assert_eq!(history.len(), viewports.len());
    for pair in history.windows(2) {
        assert!(pair[1].polygon.unsigned_area() + 1.0e-9 >= pair[0].polygon.unsigned_area());
    }
    for (index, viewport) in viewports.iter().enumerate() {
        let centre = viewport.center();
        for record in &history[index..] {
            assert!(record.polygon.contains(&centre));
        }
    }
}

#[scenario(path = "tests/features/replica.feature", name = "A covered viewport is not fetched again")]
fn covered_viewport_not_refetched(world: ReplicaWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/replica.feature", name = "Only the uncovered remainder is requested")]
fn remainder_requested(world: ReplicaWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/replica.feature", name = "Render windows are padded by their own extent")]
fn render_padding(world: ReplicaWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/replica.feature", name = "Identical viewports in flight share one fetch")]
fn single_flight(world: ReplicaWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/replica.feature", name = "A failed fetch records no coverage")]
fn failed_fetch(world: ReplicaWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/replica.feature", name = "Derived geometry settles at a fixed point")]
fn derived_fixed_point(world: ReplicaWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/replica.feature", name = "Coverage only grows")]
fn coverage_only_grows(world: ReplicaWorld) {
    let _ = world;
}
