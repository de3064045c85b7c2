use std::future::Future;
use std::time::Duration;

use ssogate_core::{StoreError, StoreResult};
use tracing::error;

use crate::error::AuthError;

/// Run one store operation under the request-scoped timeout.
pub(crate) async fn bounded<T, F>(limit: Duration, operation: &'static str, fut: F) -> Result<T, AuthError>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            error!(operation, error = %err, "store operation failed");
            Err(err.into())
        }
        Err(_) => {
            let err = StoreError::Timeout(limit.as_millis() as u64);
            error!(operation, error = %err, "store operation timed out");
            Err(err.into())
        }
    }
}
