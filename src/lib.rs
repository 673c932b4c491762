use std::sync::Arc;

use tokio::runtime::Handle;

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

use services::csv::{QualityAnalyzer, TransformEngine};
use services::jobs::{JobQueue, LocalJobQueue};
use services::progress::{MemoryProgressStore, ProgressStore};

// Application state
pub struct AppState {
    pub config: config::Config,
    pub analyzer: QualityAnalyzer,
    pub jobs: Arc<dyn JobQueue>,
    pub progress: Arc<dyn ProgressStore>,
}

impl AppState {
    /// Wires the in-process progress store and job queue.
    ///
    /// Must be called from inside a Tokio runtime; jobs are spawned on it.
    pub fn new(config: config::Config) -> Self {
        let progress: Arc<dyn ProgressStore> = Arc::new(MemoryProgressStore::default());
        let engine = TransformEngine::new(config.chunk_size, config.progress_ttl);
        let jobs = Arc::new(LocalJobQueue::new(
            engine,
            progress.clone(),
            config.max_workers,
            config.result_ttl,
            Handle::current(),
        ));

        Self {
            analyzer: QualityAnalyzer::new(config.chunk_size),
            jobs,
            progress,
            config,
        }
    }
}
