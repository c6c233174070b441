//! Accrual authority client

use crate::config::PollerConfig;
use crate::error::AccrualError;
use crate::models::AccrualResponse;
use reqwest::{Client, StatusCode};
use tracing::debug;

/// Where the poller looks orders up
#[async_trait::async_trait]
pub trait AccrualSource: Send + Sync {
    /// Ask the authority about one order. `Ok(None)` means the authority does
    /// not know the order yet.
    async fn lookup(&self, number: &str) -> Result<Option<AccrualResponse>, AccrualError>;
}

/// HTTP client for `GET {address}/api/orders/{number}`
#[derive(Debug, Clone)]
pub struct HttpAccrualClient {
    client: Client,
    base_url: String,
}

impl HttpAccrualClient {
    /// Create a new client with the configured request timeout
    pub fn new(config: &PollerConfig) -> Result<Self, AccrualError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(config.max_in_flight)
            .build()
            .map_err(|e| AccrualError::Client(e.to_string()))?;

        Ok(Self { client, base_url: config.accrual_address.trim_end_matches('/').to_string() })
    }

    fn order_url(&self, number: &str) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }
}

#[async_trait::async_trait]
impl AccrualSource for HttpAccrualClient {
    async fn lookup(&self, number: &str) -> Result<Option<AccrualResponse>, AccrualError> {
        let url = self.order_url(number);
        debug!("Looking up order at {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| AccrualError::Transport { order: number.to_string(), source })?;

        match response.status() {
            StatusCode::OK => {
                let body = response.json::<AccrualResponse>().await.map_err(|e| {
                    AccrualError::Decode { order: number.to_string(), message: e.to_string() }
                })?;
                Ok(Some(body))
            }
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => Err(AccrualError::RateLimited),
            status => Err(AccrualError::UnexpectedStatus {
                order: number.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}
