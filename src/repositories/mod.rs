pub mod account_repository;
pub mod memory;
pub mod transaction_repository;

pub use account_repository::{AccountRepository, PgAccountRepository};
pub use memory::InMemoryStore;
pub use transaction_repository::{BankTransactionRepository, PgBankTransactionRepository};

#[cfg(test)]
pub use account_repository::MockAccountRepository;
#[cfg(test)]
pub use transaction_repository::MockBankTransactionRepository;

use sqlx::PgPool;
use std::future::Future;

use crate::error::AppError;
use crate::observability::{get_metrics, LatencyTimer};

/// Database connection pool type alias.
pub type DbPool = PgPool;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Awaits a store query and records its latency and outcome under `op`.
pub(crate) async fn timed<T, E>(
    op: &'static str,
    query: impl Future<Output = std::result::Result<T, E>>,
) -> std::result::Result<T, E> {
    let timer = LatencyTimer::new();
    let result = query.await;
    get_metrics().record_db_query(op, timer.elapsed_ms(), result.is_ok());
    result
}

/// Maps constraint violations on writes to domain errors.
pub(crate) fn map_write_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some(UNIQUE_VIOLATION) => {
                return AppError::Conflict(format!(
                    "Row already linked or exists: {}",
                    db_err.message()
                ))
            }
            Some(FOREIGN_KEY_VIOLATION) => {
                return AppError::NotFound(format!(
                    "Referenced row does not exist: {}",
                    db_err.message()
                ))
            }
            _ => {}
        }
    }
    AppError::Database(err)
}
