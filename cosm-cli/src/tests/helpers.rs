//! Test helpers: a stub source builder, a scratch database and a command
//! runner that captures JSON output.

use super::*;
use cosm_replica::test_support::{CountingSource, crossing_batch};
use std::sync::{Mutex, PoisonError};
use tempfile::TempDir;

/// Serves the crossing fixture and remembers the base URLs it was built for.
pub(super) struct StubSources {
    source: Arc<CountingSource>,
    base_urls: Mutex<Vec<String>>,
}

impl StubSources {
    pub(super) fn crossing() -> Self {
        Self {
            source: Arc::new(CountingSource::new(crossing_batch())),
            base_urls: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn fetches(&self) -> usize {
        self.source.calls()
    }

    pub(super) fn base_urls(&self) -> Vec<String> {
        self.base_urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SourceBuilder for StubSources {
    fn build(&self, base_url: &str) -> Result<Arc<dyn FeatureSource>, CliError> {
        self.base_urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(base_url.to_owned());
        let source: Arc<dyn FeatureSource> = self.source.clone();
        Ok(source)
    }
}

/// A temporary directory holding the replica database.
pub(super) struct Workspace {
    _dir: TempDir,
    db: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 tempdir");
        Self {
            db: root.join("replica").join("cosm.db"),
            _dir: dir,
        }
    }

    pub(super) fn db(&self) -> &Utf8Path {
        &self.db
    }
}

/// The bounding box enclosing the whole crossing fixture.
pub(super) const CROSSING_BBOX: &str = "-0.01,-0.01,0.01,0.01";

/// Parse `args` as a `cosm` invocation and run it, returning the printed JSON.
pub(super) fn invoke(args: &[&str], sources: &dyn SourceBuilder) -> Result<Value, CliError> {
    let mut argv = vec!["cosm"];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv)?;
    let mut buffer = Vec::new();
    run_with(cli.command, sources, &mut buffer)?;
    assert!(buffer.ends_with(b"\n"), "output ends with a newline");
    Ok(serde_json::from_slice(&buffer).expect("commands print JSON"))
}

/// Sync the crossing fixture into the workspace database.
pub(super) fn seed(workspace: &Workspace, sources: &StubSources) -> Value {
    invoke(
        &["sync", "--bbox", CROSSING_BBOX, "--db", workspace.db().as_str()],
        sources,
    )
    .expect("seed sync succeeds")
}

pub(super) fn float(value: &Value) -> f64 {
    value.as_f64().expect("number")
}
