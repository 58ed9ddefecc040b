use std::sync::Arc;

use remote::{
    OcrClient, Recognizer, RemoteError, RtoClient, RtoLookup, SegmentationClient, Segmenter,
};
use thiserror::Error;
use tracing::info;

use super::{
    broadcast::ChannelBroadcaster,
    config::{Config, StoreBackend},
    database::{RedisStore, Store, StoreError},
    memory::MemoryStore,
    pipeline::Pipeline,
    region::RegionAggregator,
    validation::Validator,
};

#[derive(Error, Debug)]
pub enum InitError {
    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Client setup failed: {0}")]
    Remote(#[from] RemoteError),
}

pub struct State {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub live: Arc<ChannelBroadcaster>,
    pub validator: Arc<Validator>,
    pub regions: Arc<RegionAggregator>,
    pub pipeline: Pipeline,
}

impl State {
    pub async fn new() -> Result<Arc<Self>, InitError> {
        Self::from_config(Config::load()).await
    }

    pub async fn from_config(config: Config) -> Result<Arc<Self>, InitError> {
        let store: Arc<dyn Store> = match config.store_backend {
            StoreBackend::Redis => {
                info!("Connecting to Redis at {}", config.redis_url);
                Arc::new(RedisStore::connect(&config.redis_url, &config.redis_prefix).await?)
            }
            StoreBackend::Memory => {
                info!("Using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let segmenter = Arc::new(SegmentationClient::new(
            config.segment_url.clone(),
            config.segment_timeout(),
        )?);
        let recognizer = Arc::new(OcrClient::new(config.ocr())?);
        let rto = Arc::new(RtoClient::new(config.rto())?);

        Ok(Self::with_parts(config, store, segmenter, recognizer, rto))
    }

    pub fn with_parts(
        config: Config,
        store: Arc<dyn Store>,
        segmenter: Arc<dyn Segmenter>,
        recognizer: Arc<dyn Recognizer>,
        rto: Arc<dyn RtoLookup>,
    ) -> Arc<Self> {
        let live = Arc::new(ChannelBroadcaster::new(config.broadcast_capacity));
        let validator = Arc::new(Validator::new(store.clone(), rto));
        let regions = Arc::new(RegionAggregator::new(store.clone()));

        let pipeline = Pipeline::new(
            segmenter,
            recognizer,
            validator.clone(),
            regions.clone(),
            live.clone(),
            store.clone(),
        );

        Arc::new(Self {
            config,
            store,
            live,
            validator,
            regions,
            pipeline,
        })
    }
}
