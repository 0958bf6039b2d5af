use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("cache invalidation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cache invalidation rejected with status {0}")]
    Rejected(u16),
}

/// Tells the serving layer to evict stale query-result caches after a
/// batch that loaded new data. Delivery failures are the caller's to log;
/// they never fail the batch — the dashboards just stay stale until their
/// caches expire on their own.
pub struct CacheInvalidator {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl CacheInvalidator {
    /// Returns `None` (with a warning) when no token is configured, since
    /// the endpoint would reject an unauthenticated call anyway.
    pub fn new(api_url: &str, token: Option<&str>) -> Option<Self> {
        let Some(token) = token else {
            warn!("no internal API token configured, skipping cache invalidation");
            return None;
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;
        Some(Self {
            client,
            url: format!("{}/api/v1/admin/clear-cache", api_url.trim_end_matches('/')),
            token: token.to_string(),
        })
    }

    pub async fn invalidate(&self) -> Result<(), NotificationError> {
        info!("requesting cache invalidation at {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .header("X-Internal-Token", &self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected(status.as_u16()));
        }
        info!("cache invalidation accepted by the serving layer");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_a_token() {
        assert!(CacheInvalidator::new("http://127.0.0.1:8000", None).is_none());
        assert!(CacheInvalidator::new("http://127.0.0.1:8000", Some("s3cret")).is_some());
    }

    #[test]
    fn url_is_joined_without_double_slash() {
        let invalidator = CacheInvalidator::new("http://127.0.0.1:8000/", Some("t")).unwrap();
        assert_eq!(
            invalidator.url,
            "http://127.0.0.1:8000/api/v1/admin/clear-cache"
        );
    }
}
