//! The long-running validator and its shared state.

pub mod anchors;
pub mod memory;
pub mod ranking;
pub mod scheduler;

use std::sync::Arc;
use chrono::Utc;
use log::info;
use crate::commons::ValidatorResult;
use crate::commons::storage::ObjectStore;
use crate::config::Config;
use crate::validation::fetch::{
    FetchMode, OfflineFetcher, RepoFetcher, RsyncFetcher,
};
use crate::validation::locator::TrustAnchorLocator;
use crate::validation::process::{
    LoggingLayer, ProcessResult, TrackingLayer, ValidationRun,
};
use self::anchors::TrustAnchors;
use self::memory::MemoryImage;
use self::ranking::AsRankings;


//------------ ValidatorServer -----------------------------------------------

/// Everything a running validator needs.
pub struct ValidatorServer {
    config: Arc<Config>,
    store: Arc<ObjectStore>,
    image: Arc<MemoryImage>,
    rankings: AsRankings,
}

impl ValidatorServer {
    /// Sets up the validator from its configuration.
    ///
    /// Loads all trust anchor locators, opens the object store and, if
    /// configured, the AS ranking dump.
    pub fn build(config: Arc<Config>) -> ValidatorResult<Self> {
        let store = Arc::new(ObjectStore::new(&config.storage_uri)?);

        let mut locators = Vec::new();
        for path in config.locator_files()? {
            let locator = TrustAnchorLocator::load(&path)?;
            info!(
                "Loaded trust anchor '{}' from {}", locator, path.display()
            );
            locators.push(locator);
        }
        let anchors = TrustAnchors::new(
            locators, config.validation_interval(), Utc::now()
        )?;
        let image = Arc::new(MemoryImage::new(anchors));
        for name in &config.disabled_trust_anchors {
            image.set_enabled(name, false)?;
        }

        let rankings = match config.rankings_file.as_ref() {
            Some(path) => {
                let rankings = AsRankings::load(path)?;
                info!("Loaded {} AS rankings", rankings.len());
                rankings
            }
            None => AsRankings::default(),
        };

        Ok(ValidatorServer { config, store, image, rankings })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    pub fn image(&self) -> &Arc<MemoryImage> {
        &self.image
    }

    pub fn rankings(&self) -> &AsRankings {
        &self.rankings
    }

    /// Returns a fresh fetcher for one validation run.
    pub fn fetcher(&self) -> Arc<dyn RepoFetcher> {
        match self.config.fetch_mode {
            FetchMode::Rsync => Arc::new(RsyncFetcher::new(
                self.store.clone(), self.config.rsync_settings()
            )),
            FetchMode::Offline => {
                Arc::new(OfflineFetcher::new(self.store.clone()))
            }
        }
    }

    /// Runs the validation pipeline for one trust anchor.
    ///
    /// Fails right away if the anchor is already running or disabled.
    pub fn validate(&self, locator: Arc<TrustAnchorLocator>) -> ProcessResult {
        ValidationRun::new(
            locator,
            self.store.clone(),
            self.fetcher(),
            self.config.validation_options(),
        )
        .with_layer(TrackingLayer::new(self.image.clone()))
        .with_layer(LoggingLayer)
        .run_process()
    }
}
