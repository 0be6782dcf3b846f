use chrono::NaiveDate;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info};

use super::wire::{EventsResponse, StatisticsResponse};
use crate::config::ApiConfig;
use crate::error::FetchError;

pub type FetchResult<T> = Result<T, FetchError>;

/// Client for the two endpoint families the pipeline consumes.
///
/// Every call is a single attempt: non-2xx statuses and transport failures
/// come back as [`FetchError`] and the caller applies its retry policy.
pub struct EventsApi {
    http_client: reqwest::Client,
    rate_limiter: DefaultDirectRateLimiter,
    events_base_url: String,
    event_base_url: String,
}

impl EventsApi {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .user_agent(concat!("tennis-ingestion/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            events_base_url: config.events_base_url.trim_end_matches('/').to_string(),
            event_base_url: config.event_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn events_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/scheduled-events/{}",
            self.events_base_url,
            date.format("%Y-%m-%d")
        )
    }

    pub fn statistics_url(&self, event_id: i64) -> String {
        format!("{}/event/{}/statistics", self.event_base_url, event_id)
    }

    /// Events scheduled on `date`, in API response order, each still undecoded.
    pub async fn fetch_events(&self, date: NaiveDate) -> FetchResult<Vec<Value>> {
        let response: EventsResponse = self.get(&self.events_url(date)).await?;
        info!("Fetched {} events for {}", response.events.len(), date);
        Ok(response.events)
    }

    /// Statistics tree of one event. `statistics` is `None` when the API has none.
    pub async fn fetch_statistics(&self, event_id: i64) -> FetchResult<StatisticsResponse> {
        self.get(&self.statistics_url(event_id)).await
    }

    pub async fn fetch_statistics_raw(&self, event_id: i64) -> FetchResult<Value> {
        self.get(&self.statistics_url(event_id)).await
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> FetchResult<T> {
        self.rate_limiter.until_ready().await;

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            debug!("GET {} -> {}", url, status);
            return Err(FetchError::Http {
                status,
                url: url.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}
