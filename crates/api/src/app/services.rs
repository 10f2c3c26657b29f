//! Service wiring: picks backends from settings and assembles the playlist
//! service and its retry consumer.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use playsort_events::{InMemoryMessageQueue, MessageQueue};
use playsort_infra::{
    cache::{InMemorySnapshotCache, SnapshotCache},
    classifier::ErrorClassifier,
    credentials::{CredentialStore, InMemoryCredentialStore},
    gateway::{PlaylistGateway, YouTubeGateway, YouTubeGatewayConfig},
    orchestrator::PlaylistService,
    settings::Settings,
    workers::{RetryConsumer, RetryConsumerConfig, RetryConsumerHandle},
};

pub type DynGateway = Arc<dyn PlaylistGateway>;
pub type DynCache = Arc<dyn SnapshotCache>;
pub type DynCredentials = Arc<dyn CredentialStore>;
pub type DynQueue = Arc<dyn MessageQueue>;

pub type Playlists = PlaylistService<DynGateway, DynCache, DynCredentials, DynQueue>;

/// Concrete backends chosen at startup.
pub struct Backends {
    pub gateway: DynGateway,
    pub cache: DynCache,
    pub credentials: DynCredentials,
    /// Same store as `credentials` when it is in memory.
    pub token_seed: Option<Arc<InMemoryCredentialStore>>,
    pub queue: DynQueue,
}

impl Backends {
    /// In-memory cache, queue and credentials around `gateway`.
    pub fn in_memory(gateway: DynGateway, queue_capacity: usize) -> Self {
        let credentials = Arc::new(InMemoryCredentialStore::new());
        Self {
            gateway,
            cache: Arc::new(InMemorySnapshotCache::new()),
            credentials: credentials.clone(),
            token_seed: Some(credentials),
            queue: Arc::new(InMemoryMessageQueue::with_capacity(queue_capacity)),
        }
    }
}

pub struct AppServices {
    pub playlists: Arc<Playlists>,
    pub queue: DynQueue,
    pub token_seed: Option<Arc<InMemoryCredentialStore>>,
    consumer_config: RetryConsumerConfig,
}

impl AppServices {
    pub fn new(backends: Backends, settings: &Settings) -> Self {
        let classifier = ErrorClassifier::new(backends.queue.clone()).with_retry_delay(settings.retry_delay);
        let playlists = PlaylistService::new(backends.gateway, backends.cache, backends.credentials, classifier);

        Self {
            playlists: Arc::new(playlists),
            queue: backends.queue,
            token_seed: backends.token_seed,
            consumer_config: RetryConsumerConfig::default()
                .with_name(settings.retry_queue_name.clone())
                .with_honor_schedule(settings.retry_honor_schedule),
        }
    }

    /// Start the retry consumer on the shared queue; it stops when `shutdown` fires.
    pub fn spawn_retry_consumer(&self, shutdown: CancellationToken) -> RetryConsumerHandle {
        RetryConsumer::new(self.queue.clone(), self.playlists.clone(), self.consumer_config.clone())
            .spawn_with(shutdown)
    }
}

pub async fn build_services(settings: &Settings) -> anyhow::Result<AppServices> {
    let gateway = YouTubeGateway::new(YouTubeGatewayConfig {
        base_url: settings.youtube_api_base.clone(),
        timeout: settings.http_timeout,
    })
    .context("failed to build YouTube client")?;

    let mut backends = Backends::in_memory(Arc::new(gateway), settings.queue_capacity);

    match settings.redis_url.as_deref() {
        Some(url) => connect_redis(&mut backends, url, settings).await?,
        None => tracing::info!("REDIS_URL not set; using in-memory cache and retry queue"),
    }

    match settings.database_url.as_deref() {
        Some(url) => connect_postgres(&mut backends, url).await?,
        None => tracing::info!("DATABASE_URL not set; access tokens taken from request bearer tokens"),
    }

    Ok(AppServices::new(backends, settings))
}

#[cfg(feature = "redis")]
async fn connect_redis(backends: &mut Backends, url: &str, settings: &Settings) -> anyhow::Result<()> {
    use playsort_infra::{
        cache::RedisSnapshotCache,
        queue::{RedisStreamsConfig, RedisStreamsQueue},
    };

    let cache = RedisSnapshotCache::connect(url)
        .await
        .context("failed to connect snapshot cache to Redis")?;
    let queue = RedisStreamsQueue::connect(
        url,
        RedisStreamsConfig::default().with_stream_key(settings.retry_queue_name.clone()),
    )
    .await
    .context("failed to connect retry queue to Redis")?;

    backends.cache = Arc::new(cache);
    backends.queue = Arc::new(queue);
    tracing::info!(stream_key = %settings.retry_queue_name, "using Redis cache and retry queue");
    Ok(())
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_backends: &mut Backends, _url: &str, _settings: &Settings) -> anyhow::Result<()> {
    anyhow::bail!("REDIS_URL is set but playsort-api was built without the `redis` feature")
}

#[cfg(feature = "postgres")]
async fn connect_postgres(backends: &mut Backends, url: &str) -> anyhow::Result<()> {
    let store = playsort_infra::credentials::PostgresCredentialStore::connect(url)
        .await
        .context("failed to connect credential store to Postgres")?;
    backends.credentials = Arc::new(store);
    backends.token_seed = None;
    tracing::info!("using Postgres credential store");
    Ok(())
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(_backends: &mut Backends, _url: &str) -> anyhow::Result<()> {
    anyhow::bail!("DATABASE_URL is set but playsort-api was built without the `postgres` feature")
}
