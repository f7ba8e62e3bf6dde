//! Store selection and service wiring.
//!
//! In-memory stores by default; PostgreSQL when `USE_PERSISTENT_STORES=true`.

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use lessonbook_infra::store::{
    postgres, CatalogStore, InMemoryCatalogStore, InMemoryOrderStore, OrderStore, PostgresCatalogStore,
    PostgresOrderStore,
};
use lessonbook_infra::{seed, AppConfig, CatalogAdmin, DatabaseConfig, OrderLifecycle, OrderQueries};

pub type DynCatalogStore = Arc<dyn CatalogStore>;
pub type DynOrderStore = Arc<dyn OrderStore>;

/// Everything the handlers need, shared behind one `Arc`.
pub struct AppServices {
    pub catalog_store: DynCatalogStore,
    pub lifecycle: OrderLifecycle<DynCatalogStore, DynOrderStore>,
    pub queries: OrderQueries<DynCatalogStore, DynOrderStore>,
    pub catalog: CatalogAdmin<DynCatalogStore>,
}

impl AppServices {
    pub fn from_stores(catalog_store: DynCatalogStore, order_store: DynOrderStore) -> Self {
        Self {
            lifecycle: OrderLifecycle::new(Arc::clone(&catalog_store), Arc::clone(&order_store)),
            queries: OrderQueries::new(Arc::clone(&catalog_store), order_store),
            catalog: CatalogAdmin::new(Arc::clone(&catalog_store)),
            catalog_store,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_stores(
            Arc::new(InMemoryCatalogStore::new()),
            Arc::new(InMemoryOrderStore::new()),
        )
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let services = match &config.database {
        Some(db) => build_persistent_services(db).await?,
        None => {
            tracing::info!("using in-memory stores");
            AppServices::in_memory()
        }
    };

    if config.seed_catalog {
        seed::seed_if_empty(&services.catalog_store)
            .await
            .context("failed to seed the catalog")?;
    }

    Ok(services)
}

async fn build_persistent_services(db: &DatabaseConfig) -> anyhow::Result<AppServices> {
    let pool: PgPool = postgres::connect(&db.url, db.max_connections, db.timeout)
        .await
        .context("failed to connect to Postgres")?;
    postgres::ensure_schema(&pool)
        .await
        .context("failed to prepare the database schema")?;

    tracing::info!(max_connections = db.max_connections, "using Postgres stores");
    Ok(AppServices::from_stores(
        Arc::new(PostgresCatalogStore::new(pool.clone())),
        Arc::new(PostgresOrderStore::new(pool)),
    ))
}
