use std::path::PathBuf;
use std::sync::Arc;

/// A media-server integration that can refresh individual library paths.
pub trait PathRefresher: Send + Sync {
    fn refresh_paths(&self, paths: &[PathBuf]);
}

/// A media-server integration that can only refresh the whole library.
pub trait WholeRefresher: Send + Sync {
    fn refresh_all(&self);
}

/// The refresh capability wired up once at startup. Which variant an
/// integration supports is decided at wiring time, not probed per call.
#[derive(Clone, Default)]
pub enum LibraryRefresh {
    ByPaths(Arc<dyn PathRefresher>),
    Whole(Arc<dyn WholeRefresher>),
    #[default]
    Off,
}

impl LibraryRefresh {
    /// Notify the integration about freshly written pointer files.
    pub fn notify(&self, paths: &[PathBuf]) {
        if paths.is_empty() {
            return;
        }
        match self {
            LibraryRefresh::ByPaths(r) => r.refresh_paths(paths),
            LibraryRefresh::Whole(r) => r.refresh_all(),
            LibraryRefresh::Off => {}
        }
    }
}
