//! Translation of driver errors into `GraphError`
//!
//! Nothing returned by this crate carries a raw `sqlx::Error`.

use pgraph_core::GraphError;

/// `map_err` adapter naming the failed operation
pub fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> GraphError {
    move |e| classify(context, e)
}

/// Route a driver error to the matching `GraphError` variant
pub fn classify(context: &str, err: sqlx::Error) -> GraphError {
    match &err {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            GraphError::IntegrityError(format!("{context}: {}", db.message()))
        }
        // Class 08 (connection exception) and 28 (invalid authorization)
        sqlx::Error::Database(db)
            if db
                .code()
                .is_some_and(|c| c.starts_with("08") || c.starts_with("28")) =>
        {
            GraphError::ConnectionError(format!("{context}: {}", db.message()))
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => GraphError::ConnectionError(format!("{context}: {err}")),
        sqlx::Error::Configuration(_) => {
            GraphError::ConnectionError(format!("{context}: invalid connection settings: {err}"))
        }
        _ => GraphError::DatabaseError(format!("{context}: {err}")),
    }
}
