//! Store, index, and worker wiring.
//!
//! - records: in memory by default, Postgres with `USE_PERSISTENT_STORES=true`
//! - search index: Elasticsearch when `SEARCH_URL` is set, in memory otherwise
//!
//! The index task queue is always in memory. In persistent mode a full reindex is queued
//! at startup so tasks lost with a previous process are made up for.

use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use campus_buildings::{Building, BuildingDataDefinition};
use campus_core::Entity;
use campus_infos::{Info, InfoDefinition, Notification};
use campus_infra::{
    indexer::{InMemoryIndexTaskStore, IndexQueue, IndexWorker, IndexWorkerConfig, IndexWorkerHandle},
    repository::{self, EntityRepository, InMemoryEntityRepository, PostgresEntityRepository},
    search::{ElasticsearchRepository, InMemorySearchIndex, SearchRepository},
    AppConfig, EntityService, Reindex,
};

pub struct AppServices {
    pub app_name: String,
    pub buildings: EntityService<Building>,
    pub building_data_definitions: EntityService<BuildingDataDefinition>,
    pub info_definitions: EntityService<InfoDefinition>,
    pub infos: EntityService<Info>,
    pub notifications: EntityService<Notification>,
    pub index_queue: IndexQueue,
    /// Held for the lifetime of the app; dropping it stops the worker.
    pub worker: Arc<IndexWorkerHandle>,
}

impl AppServices {
    pub fn reindexers(&self) -> [&dyn Reindex; 5] {
        [
            &self.buildings,
            &self.building_data_definitions,
            &self.info_definitions,
            &self.infos,
            &self.notifications,
        ]
    }

    /// Reindex entry point for a collection path segment (e.g. `buildings`).
    pub fn reindexer(&self, collection: &str) -> Option<&dyn Reindex> {
        self.reindexers().into_iter().find(|r| r.collection() == collection)
    }
}

enum PrimaryStore {
    InMemory,
    Postgres(PgPool),
}

enum SearchBackend {
    InMemory,
    Elasticsearch { client: reqwest::Client, url: String },
}

struct Wiring {
    primary: PrimaryStore,
    search: SearchBackend,
    queue: IndexQueue,
    worker: IndexWorker,
}

impl Wiring {
    /// Build the service for `E` and register its index sink with the worker.
    fn service<E: Entity>(&mut self) -> EntityService<E> {
        let repository: Arc<dyn EntityRepository<E>> = match &self.primary {
            PrimaryStore::InMemory => Arc::new(InMemoryEntityRepository::<E>::new()),
            PrimaryStore::Postgres(pool) => Arc::new(PostgresEntityRepository::<E>::new(pool.clone())),
        };
        let search: Arc<dyn SearchRepository<E>> = match &self.search {
            SearchBackend::InMemory => Arc::new(InMemorySearchIndex::<E>::new()),
            SearchBackend::Elasticsearch { client, url } => {
                Arc::new(ElasticsearchRepository::<E>::new(client.clone(), url.clone()))
            }
        };
        self.worker.register::<E>(repository.clone(), search.clone());
        EntityService::new(repository, search, self.queue.clone())
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let primary = match (config.persistent_stores, &config.database_url) {
        (true, Some(url)) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            repository::postgres::ensure_schema(&pool)
                .await
                .context("failed to prepare the record table")?;
            PrimaryStore::Postgres(pool)
        }
        (true, None) => anyhow::bail!("USE_PERSISTENT_STORES=true requires DATABASE_URL"),
        (false, _) => PrimaryStore::InMemory,
    };

    let search = match &config.search_url {
        Some(url) => SearchBackend::Elasticsearch {
            client: reqwest::Client::new(),
            url: url.clone(),
        },
        None => SearchBackend::InMemory,
    };

    let queue = IndexQueue::new(InMemoryIndexTaskStore::arc(), config.retry_policy.clone());
    let worker = IndexWorker::new(
        &queue,
        IndexWorkerConfig {
            poll_interval: config.poll_interval,
            ..IndexWorkerConfig::default()
        },
    );

    let mut wiring = Wiring {
        primary,
        search,
        queue,
        worker,
    };
    let buildings = wiring.service::<Building>();
    let building_data_definitions = wiring.service::<BuildingDataDefinition>();
    let info_definitions = wiring.service::<InfoDefinition>();
    let infos = wiring.service::<Info>();
    let notifications = wiring.service::<Notification>();

    let persistent = matches!(wiring.primary, PrimaryStore::Postgres(_));
    let Wiring { queue, worker, .. } = wiring;

    let services = AppServices {
        app_name: config.app_name.clone(),
        buildings,
        building_data_definitions,
        info_definitions,
        infos,
        notifications,
        index_queue: queue,
        worker: Arc::new(worker.spawn()),
    };

    if persistent {
        for target in services.reindexers() {
            let enqueued = target.reindex().await.context("startup reindex failed")?;
            info!(entity = target.entity_name(), enqueued, "startup reindex queued");
        }
    }

    Ok(services)
}
