use std::time::Duration;

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema,
};
use tracing::info;

use crate::config::AppConfig;
use crate::entities;
use crate::errors::ServiceError;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Establishes a connection pool using the app configuration.
pub async fn establish_connection(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let mut opts = ConnectOptions::new(cfg.database_url.clone());
    opts.max_connections(cfg.db_max_connections)
        .min_connections(cfg.db_min_connections)
        .connect_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(false);

    let db = Database::connect(opts).await?;
    info!(backend = ?db.get_database_backend(), "database connection established");
    Ok(db)
}

/// Creates every table this service owns, if missing. Derived straight from
/// the entity definitions so tests and fresh deployments share one schema.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), ServiceError> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    macro_rules! create {
        ($entity:expr) => {{
            let mut stmt = schema.create_table_from_entity($entity);
            stmt.if_not_exists();
            db.execute(backend.build(&stmt)).await?;
        }};
    }

    create!(entities::Cart);
    create!(entities::CartItem);
    create!(entities::CustomerAddress);
    create!(entities::Order);
    create!(entities::OrderItem);
    create!(entities::OrderEvent);
    create!(entities::StagedOrder);

    info!("schema ensured");
    Ok(())
}
