//! Redis stream of ingested matches.
//!
//! Publishing is best effort: a failed `XADD` is logged by the caller and
//! never fails ingestion.

use anyhow::Result;
use redis::AsyncCommands;
use serde::Serialize;
use uuid::Uuid;

use crate::retry::{connect_with_backoff, RetryPolicy};

pub const STREAM_KEY: &str = "tennis.matches";

/// One match write, as announced on the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchNotice {
    pub event_id: i64,
    pub match_id: Uuid,
    pub created: bool,
    pub status: Option<String>,
}

impl MatchNotice {
    fn fields(&self) -> Result<Vec<(&'static str, String)>> {
        Ok(vec![
            ("event_id", self.event_id.to_string()),
            ("match_id", self.match_id.to_string()),
            ("created", self.created.to_string()),
            ("data", serde_json::to_string(self)?),
        ])
    }
}

#[derive(Clone)]
pub struct ChangeFeed {
    conn: redis::aio::ConnectionManager,
}

impl ChangeFeed {
    pub async fn connect(url: &str, policy: &RetryPolicy) -> Result<Self> {
        let conn = connect_with_backoff(policy, "Redis", move || async move {
            match redis::Client::open(url) {
                Ok(client) => redis::aio::ConnectionManager::new(client).await,
                Err(e) => Err(e),
            }
        })
        .await?;
        Ok(Self { conn })
    }

    pub async fn publish(&self, notice: &MatchNotice) -> Result<()> {
        let fields = notice.fields()?;
        let mut conn = self.conn.clone();
        let _: String = conn.xadd(STREAM_KEY, "*", &fields[..]).await?;
        Ok(())
    }
}
