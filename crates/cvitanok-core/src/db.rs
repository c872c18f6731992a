use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database as SeaDatabase, DatabaseConnection, DbErr};
use tokio::sync::OnceCell;

use crate::config::Config;

/// Open a connection pool for `config.database_url`.
pub async fn connect(config: &Config) -> Result<DatabaseConnection, DbErr> {
    let mut opts = ConnectOptions::new(&config.database_url);
    opts.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(config.is_dev());

    SeaDatabase::connect(opts).await
}

/// Idle timeout and lifetime of the in-memory connection: long enough that
/// the pool never retires it.
const IN_MEMORY_KEEPALIVE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A private in-memory SQLite database.
///
/// Held on a single connection: every new SQLite memory connection is a new,
/// empty database.
pub async fn connect_in_memory() -> Result<DatabaseConnection, DbErr> {
    SeaDatabase::connect(in_memory_options()).await
}

fn in_memory_options() -> ConnectOptions {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .idle_timeout(IN_MEMORY_KEEPALIVE)
        .max_lifetime(IN_MEMORY_KEEPALIVE)
        .sqlx_logging(false);
    opts
}

/// Lazily connected database handle.
///
/// Nothing touches the network until the first session is requested, so an
/// app whose session provider is overridden never connects at all.
#[derive(Clone)]
pub struct DatabasePool {
    config: Arc<Config>,
    conn: Arc<OnceCell<DatabaseConnection>>,
}

impl DatabasePool {
    pub fn new(config: Arc<Config>) -> Self {
        DatabasePool {
            config,
            conn: Arc::new(OnceCell::new()),
        }
    }

    /// Wrap an already open connection.
    pub fn from_connection(config: Arc<Config>, conn: DatabaseConnection) -> Self {
        DatabasePool {
            config,
            conn: Arc::new(OnceCell::new_with(Some(conn))),
        }
    }

    /// The pool, connecting on first use.
    pub async fn get(&self) -> Result<DatabaseConnection, DbErr> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                tracing::info!("connecting to database");
                connect(&self.config).await
            })
            .await?;
        Ok(conn.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.conn.initialized()
    }
}

impl std::fmt::Debug for DatabasePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabasePool")
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts;
    use crate::migrations::Migrator;
    use sea_orm_migration::MigratorTrait;

    #[test]
    fn in_memory_connection_is_never_retired() {
        let opts = format!("{:?}", in_memory_options());
        let keepalive = format!("{IN_MEMORY_KEEPALIVE:?}");
        assert_eq!(opts.matches(&keepalive).count(), 2, "{opts}");
    }

    #[tokio::test]
    async fn in_memory_database_keeps_its_schema() {
        let db = connect_in_memory().await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        for _ in 0..5 {
            assert_eq!(accounts::count_users(&db).await.unwrap(), 0);
        }
    }
}
