use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{Extraction, ExtractionError, ReceiptExtractor, ReceiptImage};

/// Bounds every model call with a timeout and retries transient failures a fixed
/// number of times.
#[derive(Clone)]
pub struct RetryingExtractor {
    inner: Arc<dyn ReceiptExtractor>,
    attempt_timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl RetryingExtractor {
    pub fn new(inner: Arc<dyn ReceiptExtractor>, attempt_timeout: Duration, max_retries: u32) -> Self {
        Self {
            inner,
            attempt_timeout,
            max_retries,
            backoff: Duration::from_millis(500),
        }
    }

    /// Pause between attempts (default 500ms).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl ReceiptExtractor for RetryingExtractor {
    async fn extract(
        &self,
        image: ReceiptImage,
        today: NaiveDate,
    ) -> Result<Extraction, ExtractionError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result =
                match tokio::time::timeout(self.attempt_timeout, self.inner.extract(image.clone(), today)).await {
                    Ok(result) => result,
                    Err(_) => Err(ExtractionError::Timeout(self.attempt_timeout)),
                };

            match result {
                Ok(extraction) => return Ok(extraction),
                Err(err) if err.is_retryable() && attempt <= self.max_retries => {
                    tracing::warn!(
                        error = %err,
                        attempt = attempt,
                        max_retries = self.max_retries,
                        "Receipt extraction failed, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(err) => {
                    tracing::error!(error = %err, attempts = attempt, "Receipt extraction failed");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use expensa_core::models::normalize_extraction;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the scripted errors first, then succeeds.
    struct Flaky {
        calls: AtomicU32,
        failures: usize,
        error: fn() -> ExtractionError,
        hang: bool,
    }

    #[async_trait]
    impl ReceiptExtractor for Flaky {
        async fn extract(
            &self,
            _image: ReceiptImage,
            today: NaiveDate,
        ) -> Result<Extraction, ExtractionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if n < self.failures {
                return Err((self.error)());
            }
            let raw = json!({"merchant_name": "Indomaret", "amount": 23500});
            Ok(Extraction {
                receipt: normalize_extraction(&raw, today),
                raw,
            })
        }
    }

    fn transient() -> ExtractionError {
        ExtractionError::Transient("503".into())
    }

    fn image() -> ReceiptImage {
        ReceiptImage {
            data: Bytes::from_static(b"img"),
            media_type: "image/png".to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn retrying(inner: Arc<Flaky>, max_retries: u32) -> RetryingExtractor {
        RetryingExtractor::new(inner, Duration::from_millis(50), max_retries)
            .with_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn retries_once_on_transient_failure() {
        let inner = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 1,
            error: transient,
            hang: false,
        });
        let result = retrying(inner.clone(), 1).extract(image(), today()).await.unwrap();
        assert_eq!(result.receipt.merchant_name, "Indomaret");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let inner = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 2,
            error: transient,
            hang: false,
        });
        let err = retrying(inner.clone(), 1).extract(image(), today()).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Transient(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_invalid_json() {
        let inner = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 1,
            error: || ExtractionError::NoJson,
            hang: false,
        });
        let err = retrying(inner.clone(), 3).extract(image(), today()).await.unwrap_err();
        assert!(matches!(err, ExtractionError::NoJson));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hanging_model_times_out() {
        let inner = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 0,
            error: transient,
            hang: true,
        });
        let err = retrying(inner.clone(), 1).extract(image(), today()).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Timeout(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);

        let app_err: expensa_core::AppError = err.into();
        assert!(matches!(app_err, expensa_core::AppError::ExtractionTimedOut(_)));
    }
}
