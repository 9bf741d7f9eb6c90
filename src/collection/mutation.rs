use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, warn};

use super::store::Collection;
use crate::event::CollectionEvent;
use crate::shared::ApiError;

/// The four parts of one optimistic mutation, named explicitly so the
/// compiler enforces that each transform operates on the collection
/// value *as it is when the transform runs*, not on a snapshot captured
/// when the mutation was built.
///
/// Lives only for the duration of one `mutate` call.
pub struct MutationDescriptor<C, R> {
    /// Applied to the live collection before the remote call starts.
    pub optimistic_update: Box<dyn FnOnce(C) -> C + Send>,
    /// The effectful remote call. May fail; never retried here.
    pub api_call: BoxFuture<'static, Result<R, ApiError>>,
    /// Reconciles the remote result into the collection as it is at
    /// completion time, preserving any edits that landed in between.
    pub apply_result: Box<dyn FnOnce(C, &R) -> C + Send>,
    /// Undoes the optimistic edit against the live value on failure.
    pub rollback: Box<dyn FnOnce(C) -> C + Send>,
}

/// A mutation whose remote call failed. The optimistic edit has already
/// been rolled back by the time the caller sees this.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("request failed and the optimistic edit was rolled back: {0}")]
    RolledBack(#[source] ApiError),
}

impl MutationError {
    /// The underlying transport failure, for user-facing messaging.
    pub fn cause(&self) -> &ApiError {
        match self {
            MutationError::RolledBack(err) => err,
        }
    }
}

/// Optimistic-update executor over one published collection.
///
/// Within a call the four steps are strictly ordered; between calls
/// nothing is ordered. Correctness under interleaving comes entirely
/// from every step reading the live value, not from mutual exclusion:
/// there are no locks held across the remote call and no retries.
pub struct MutationEngine<C> {
    collection: Collection<C>,
}

impl<C: Clone + Send + Sync> MutationEngine<C> {
    pub fn new(collection: Collection<C>) -> Self {
        Self { collection }
    }

    pub fn collection(&self) -> &Collection<C> {
        &self.collection
    }

    /// Runs one mutation: optimistic edit, remote call, then reconcile
    /// on success or rollback on failure. All failure classes (network,
    /// 4xx, 5xx) take the same rollback path; the distinction is left
    /// to the caller's error message.
    pub async fn mutate<R>(&self, descriptor: MutationDescriptor<C, R>) -> Result<R, MutationError>
    where
        R: Send,
    {
        let key = self.collection.key().clone();

        self.collection
            .replace(
                descriptor.optimistic_update,
                CollectionEvent::OptimisticApplied { key: key.clone() },
            )
            .await;
        debug!(%key, "Optimistic update applied, starting remote call");

        match descriptor.api_call.await {
            Ok(result) => {
                let apply_result = descriptor.apply_result;
                self.collection
                    .replace(
                        |current| apply_result(current, &result),
                        CollectionEvent::ResultApplied { key: key.clone() },
                    )
                    .await;
                debug!(%key, "Remote result reconciled into collection");
                Ok(result)
            }
            Err(error) => {
                self.collection
                    .replace(
                        descriptor.rollback,
                        CollectionEvent::RolledBack { key: key.clone() },
                    )
                    .await;
                warn!(%key, %error, "Mutation failed, optimistic edit rolled back");
                Err(MutationError::RolledBack(error))
            }
        }
    }
}
