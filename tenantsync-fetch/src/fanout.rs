//! Running one query against every account concurrently.
//!
//! Each account gets its own tokio task. Results come back in account order
//! no matter which task finishes first, and one account's failure (or panic)
//! never touches its siblings.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tenantsync_core::{AccountInfo, FetchError};
use tracing::{debug, instrument, warn};

use crate::backend::AccountBackend;
use crate::context::Context;
use crate::multistore::MultiStore;

// ============================================================================
// Results
// ============================================================================

/// Outcome of a fan-out query against one account.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountResult<T> {
    /// The account queried.
    pub account: AccountInfo,
    /// What it returned.
    pub result: Result<T, FetchError>,
}

/// Aggregate shape of a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOutOutcome {
    /// Every account succeeded (or there were none).
    Complete,
    /// Some accounts failed.
    Partial {
        /// Number of failed accounts.
        failed: usize,
    },
    /// Every account failed.
    Total,
}

/// Per-account results of a fan-out, in account order.
#[derive(Debug, Clone, PartialEq)]
pub struct FanOutResults<T> {
    results: Vec<AccountResult<T>>,
}

impl<T> FanOutResults<T> {
    /// Wraps already-ordered results.
    pub fn new(results: Vec<AccountResult<T>>) -> Self {
        Self { results }
    }

    /// Number of accounts queried.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if no accounts were queried.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterates results in account order.
    pub fn iter(&self) -> impl Iterator<Item = &AccountResult<T>> {
        self.results.iter()
    }

    /// Number of failed accounts.
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_err()).count()
    }

    /// Classifies the fan-out.
    pub fn outcome(&self) -> FanOutOutcome {
        match self.failed() {
            0 => FanOutOutcome::Complete,
            n if n == self.results.len() => FanOutOutcome::Total,
            failed => FanOutOutcome::Partial { failed },
        }
    }

    /// Iterates successful values with their account.
    pub fn successes(&self) -> impl Iterator<Item = (&AccountInfo, &T)> {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref().ok().map(|v| (&r.account, v)))
    }

    /// Returns the raw results.
    pub fn into_inner(self) -> Vec<AccountResult<T>> {
        self.results
    }

    /// Fails only when every account failed.
    ///
    /// If all of them were cancelled the error is [`FetchError::Cancelled`],
    /// so callers stay silent about abandoned work.
    pub fn into_result(self) -> Result<Vec<AccountResult<T>>, FetchError> {
        if self.outcome() != FanOutOutcome::Total {
            return Ok(self.results);
        }

        if self
            .results
            .iter()
            .all(|r| r.result.as_ref().is_err_and(FetchError::is_cancelled))
        {
            return Err(FetchError::Cancelled);
        }

        let count = self.results.len();
        let first = self
            .results
            .into_iter()
            .find_map(|r| r.result.err())
            .unwrap_or(FetchError::Cancelled);
        Err(FetchError::AllAccountsFailed {
            count,
            first: Box::new(first),
        })
    }
}

impl<T> IntoIterator for FanOutResults<T> {
    type Item = AccountResult<T>;
    type IntoIter = std::vec::IntoIter<AccountResult<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

// ============================================================================
// Fan-out
// ============================================================================

impl<B: AccountBackend> MultiStore<B> {
    /// Runs `f` against every account concurrently.
    ///
    /// A task whose context is already cancelled when it would start records
    /// [`FetchError::Cancelled`] without calling `f`.
    #[instrument(skip_all)]
    pub async fn fan_out<T, F, Fut>(&self, ctx: &Context, f: F) -> FanOutResults<T>
    where
        T: Send + 'static,
        F: Fn(Context, AccountInfo, Arc<B::Client>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let accounts = self.accounts();
        if accounts.is_empty() {
            return FanOutResults::new(Vec::new());
        }
        debug!(accounts = accounts.len(), "Fanning out");

        let f = Arc::new(f);
        let handles: Vec<_> = accounts
            .iter()
            .map(|account| {
                let f = f.clone();
                let ctx = ctx.clone();
                let account = account.clone();
                let client = self.client_for(&account.id);
                let limit = self.limit.clone();
                tokio::spawn(async move {
                    let _permit = match limit {
                        Some(sem) => Some(
                            ctx.run(async {
                                sem.acquire_owned()
                                    .await
                                    .map_err(|_| FetchError::Cancelled)
                            })
                            .await?,
                        ),
                        None => None,
                    };
                    ctx.check()?;
                    (*f)(ctx.clone(), account, client).await
                })
            })
            .collect();

        let results = join_all(handles)
            .await
            .into_iter()
            .zip(accounts)
            .map(|(joined, account)| {
                let result = joined.unwrap_or_else(|e| {
                    warn!(account = %account.id, error = %e, "Fan-out task failed");
                    Err(FetchError::Other(format!("task for account {} failed: {e}", account.id)))
                });
                AccountResult { account, result }
            })
            .collect();

        FanOutResults::new(results)
    }

    /// Runs `f` against a single account.
    pub async fn fan_out_single<T, F, Fut>(
        &self,
        ctx: &Context,
        account_id: &str,
        f: F,
    ) -> Result<T, FetchError>
    where
        F: FnOnce(Context, Arc<B::Client>) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        ctx.check()?;
        let client = self.client_for(account_id);
        ctx.run(f(ctx.clone(), client)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(items: Vec<Result<u32, FetchError>>) -> FanOutResults<u32> {
        FanOutResults::new(
            items
                .into_iter()
                .enumerate()
                .map(|(i, result)| AccountResult {
                    account: AccountInfo::new(i.to_string(), format!("Account {i}")),
                    result,
                })
                .collect(),
        )
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(results(vec![Ok(1), Ok(2)]).outcome(), FanOutOutcome::Complete);
        assert_eq!(
            results(vec![Ok(1), Err(FetchError::NotFound("x".into()))]).outcome(),
            FanOutOutcome::Partial { failed: 1 }
        );
        assert_eq!(
            results(vec![Err(FetchError::Cancelled)]).outcome(),
            FanOutOutcome::Total
        );
        assert_eq!(results(vec![]).outcome(), FanOutOutcome::Complete);
    }

    #[test]
    fn test_partial_failure_is_ok() {
        let r = results(vec![Ok(1), Err(FetchError::Transport("down".into())), Ok(3)]);
        let values: Vec<u32> = r.successes().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![1, 3]);
        assert_eq!(r.into_result().unwrap().len(), 3);
    }

    #[test]
    fn test_total_failure_reports_first_error() {
        let err = results(vec![
            Err(FetchError::Unauthorized("a".into())),
            Err(FetchError::Transport("b".into())),
        ])
        .into_result()
        .unwrap_err();

        match err {
            FetchError::AllAccountsFailed { count, first } => {
                assert_eq!(count, 2);
                assert_eq!(*first, FetchError::Unauthorized("a".into()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_total_cancellation_is_silent() {
        let err = results(vec![
            Err(FetchError::Cancelled),
            Err(FetchError::Cancelled.context("acct")),
        ])
        .into_result()
        .unwrap_err();
        assert_eq!(err, FetchError::Cancelled);
    }
}
