use std::net::SocketAddr;
use std::sync::Arc;

use crate::base_system::context::{Config, StorageLayout};
use crate::base_system::rate_limit::RateLimiter;
use crate::catalog::SqliteCatalog;
use crate::download::{Downloader, PipelineSettings};
use crate::extractor::MediaExtractor;
use crate::postprocess::Transcoder;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) bind_addrs: Arc<Vec<SocketAddr>>,
    pub(crate) config: Arc<Config>,
    pub(crate) layout: Arc<StorageLayout>,
    pub(crate) catalog: SqliteCatalog,
    pub(crate) downloader: Arc<Downloader>,
    /// Guards `/api/download` only; shared by every caller.
    pub(crate) limiter: Arc<RateLimiter>,
}

impl AppState {
    pub(crate) fn assemble(
        config: Config,
        bind_addrs: Vec<SocketAddr>,
        extractor: Arc<dyn MediaExtractor>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        let layout = config.layout();
        let catalog = SqliteCatalog::new(config.database_path());
        let downloader = Downloader::new(
            PipelineSettings::from_config(&config),
            extractor,
            transcoder,
            catalog.clone(),
        );
        let limiter = RateLimiter::new(config.download_rate_limit, config.rate_window());
        Self {
            bind_addrs: Arc::new(bind_addrs),
            config: Arc::new(config),
            layout: Arc::new(layout),
            catalog,
            downloader: Arc::new(downloader),
            limiter: Arc::new(limiter),
        }
    }
}
