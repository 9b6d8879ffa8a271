/// Database layer for the Postgres backend
///
/// # Modules
///
/// - `pool`: Connection pool creation with a startup health check
/// - `migrations`: Embedded schema migrations (`migrations/` in this crate)
///
/// # Example
///
/// ```no_run
/// use tasklane_access::db::{migrations::run_migrations, pool::{create_pool, DatabaseConfig}};
/// use tasklane_access::store::postgres::PgStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig {
///         url: std::env::var("DATABASE_URL")?,
///         ..Default::default()
///     };
///
///     let pool = create_pool(config).await?;
///     run_migrations(&pool).await?;
///     let store = PgStore::new(pool);
///     Ok(())
/// }
/// ```

pub mod migrations;
pub mod pool;
