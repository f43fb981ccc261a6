//! Bridge from async handlers and jobs to SQLite and CPU-bound work.

use tokio::task::JoinError;

use crate::error::StoreError;

/// Runs `work` on the blocking pool. A panic inside `work` comes back as
/// `StoreError::Worker` carrying the panic message.
pub async fn blocking<T, E, F>(work: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: From<StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| E::from(StoreError::Worker(panic_message(e))))?
}

pub fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "worker panicked".to_string()),
        Err(err) => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_the_closure_result() {
        let out: Result<u32, StoreError> = blocking(|| Ok(7)).await;
        assert_eq!(out.unwrap(), 7);

        let err: Result<u32, StoreError> = blocking(|| Err(StoreError::Poisoned)).await;
        assert!(matches!(err, Err(StoreError::Poisoned)));
    }

    #[tokio::test]
    async fn panic_becomes_worker_error() {
        let out: Result<(), StoreError> = blocking(|| panic!("disk on fire")).await;
        match out {
            Err(StoreError::Worker(msg)) => assert_eq!(msg, "disk on fire"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
