/*!
 * Transaction helper
 *
 * Runs a closure inside one database transaction and hands back the closure's
 * own error type instead of flattening it into `DbErr`.
 */

use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionError, TransactionTrait};
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction
///
/// Commits when the closure returns `Ok`, rolls back on `Err`. A failure to
/// begin or commit is converted with `E: From<DbErr>`.
///
/// # Example
///
/// ```rust,ignore
/// use crate::db::transaction::with_transaction;
///
/// let images = with_transaction(&db, move |txn| {
///     Box::pin(async move {
///         let snapshot = load_snapshot(txn, product_id).await?;
///         let plan = reconciler.compute_plan(&snapshot.images, &desired)?;
///         apply(txn, &snapshot, &plan).await
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T, E>(db: &DatabaseConnection, f: F) -> Result<T, E>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, E>> + Send,
    T: Send,
    E: From<DbErr> + std::error::Error + Send,
{
    db.transaction(f).await.map_err(|e| match e {
        TransactionError::Connection(db_err) => E::from(db_err),
        TransactionError::Transaction(err) => err,
    })
}
