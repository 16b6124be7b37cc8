//! Scoped BEGIN/COMMIT/ROLLBACK guard.
//!
//! A handler that mutates several tables opens one `TransactionScope`
//! for the whole compound operation. The scope refuses nested `begin`
//! calls and carries a context label for diagnostics. Because an async
//! drop cannot issue the ROLLBACK itself, the rollback guarantee lives
//! in the worker: after every handler attempt it rolls back whatever the
//! session still reports open. A scope dropped while open logs the
//! context so the leak is visible.

use tracing::error;

use crate::db::DatabaseSession;
use crate::error::QueryManagerError;

pub struct TransactionScope {
    context: &'static str,
    open: bool,
}

impl TransactionScope {
    #[must_use]
    pub fn new(context: &'static str) -> Self {
        Self {
            context,
            open: false,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Issue BEGIN. Fails if this scope already holds a transaction.
    ///
    /// # Errors
    /// Returns an error for nested begins or when the backend refuses.
    pub async fn begin(&mut self, db: &mut DatabaseSession) -> Result<(), QueryManagerError> {
        if self.open {
            return Err(QueryManagerError::ExecutionError(format!(
                "{}: transaction already in progress",
                self.context
            )));
        }
        db.begin().await?;
        self.open = true;
        Ok(())
    }

    /// Issue COMMIT and release the hold.
    ///
    /// # Errors
    /// Returns an error when no transaction is open or the commit fails.
    pub async fn commit(&mut self, db: &mut DatabaseSession) -> Result<(), QueryManagerError> {
        if !self.open {
            return Err(QueryManagerError::ExecutionError(format!(
                "{}: no transaction to commit",
                self.context
            )));
        }
        db.commit().await?;
        self.open = false;
        Ok(())
    }

    /// Issue ROLLBACK and release the hold. A no-op when nothing is open.
    ///
    /// # Errors
    /// Returns an error when the backend refuses the rollback.
    pub async fn rollback(&mut self, db: &mut DatabaseSession) -> Result<(), QueryManagerError> {
        if self.open {
            self.open = false;
            db.rollback().await?;
        }
        Ok(())
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if self.open {
            error!(
                "transaction scope {} dropped while open; the worker rolls back",
                self.context
            );
        }
    }
}
