// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{NewsPage, NewsQuery, NewsSource, MAX_PAGE_SIZE};
use crate::error::SourceError;
use crate::models::{AggregatesResponse, Bar, NewsResponse, Timespan};

/// Most bars the aggregates endpoint returns per page.
const MAX_AGGS_PAGE_SIZE: usize = 50_000;

/// REST client for the Massive (formerly Polygon.io) market data API.
pub struct MassiveClient {
    client: Client,
    api_key: String,
    base_url: Url,
}

impl MassiveClient {
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SourceError::InvalidRequest(format!("bad base url {}: {}", base_url, e)))?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SourceError> {
        self.base_url
            .join(path)
            .map_err(|e| SourceError::InvalidRequest(format!("bad path {}: {}", path, e)))
    }

    pub(crate) fn news_url(&self, query: &NewsQuery) -> Result<Url, SourceError> {
        if query.ticker.is_empty() {
            return Err(SourceError::InvalidRequest("ticker empty".to_string()));
        }

        let mut url = self.endpoint("/v2/reference/news")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("ticker", &query.ticker)
                .append_pair("limit", &query.limit.clamp(1, MAX_PAGE_SIZE).to_string())
                .append_pair("order", "desc")
                .append_pair("sort", "published_utc");
            if let Some(from) = query.published_from {
                pairs.append_pair("published_utc.gte", &from.format("%Y-%m-%d").to_string());
            }
            if let Some(to) = query.published_to {
                pairs.append_pair("published_utc.lte", &to.format("%Y-%m-%d").to_string());
            }
        }
        Ok(url)
    }

    pub(crate) fn aggs_url(
        &self,
        ticker: &str,
        multiplier: u32,
        timespan: Timespan,
        from: NaiveDate,
        to: NaiveDate,
        limit: usize,
    ) -> Result<Url, SourceError> {
        if ticker.is_empty() {
            return Err(SourceError::InvalidRequest("ticker empty".to_string()));
        }

        let path = format!(
            "/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            ticker,
            multiplier.max(1),
            timespan,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );
        let mut url = self.endpoint(&path)?;
        url.query_pairs_mut()
            .append_pair("adjusted", "true")
            .append_pair("sort", "asc")
            .append_pair("limit", &limit.clamp(1, MAX_AGGS_PAGE_SIZE).to_string());
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        debug!(%url, "GET");

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited(text));
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str::<T>(&text).map_err(|e| {
            debug!("Raw response: {}", text);
            SourceError::Decode(e)
        })
    }

    /// List OHLCV aggregate bars, following pagination until `limit` bars
    /// have been collected or the range is exhausted.
    pub async fn list_aggs(
        &self,
        ticker: &str,
        multiplier: u32,
        timespan: Timespan,
        from: NaiveDate,
        to: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Bar>, SourceError> {
        let first = self
            .aggs_url(ticker, multiplier, timespan, from, to, limit)?
            .to_string();
        collect_bars(first, limit, |url| async move { self.get_json(&url).await }).await
    }
}

/// Follow `next_url` from `first` until `limit` bars are collected, the
/// cursor runs out or a page comes back empty.
async fn collect_bars<F, Fut>(first: String, limit: usize, mut fetch: F) -> Result<Vec<Bar>, SourceError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<AggregatesResponse, SourceError>>,
{
    let mut bars = Vec::new();
    let mut next = Some(first);

    while let Some(url) = next.take() {
        let page = fetch(url).await?;
        if page.results.is_empty() {
            break;
        }
        bars.extend(page.results);
        if bars.len() >= limit {
            bars.truncate(limit);
            break;
        }
        next = page.next_url;
    }

    Ok(bars)
}

#[async_trait]
impl NewsSource for MassiveClient {
    async fn news_page(
        &self,
        query: &NewsQuery,
        cursor: Option<String>,
    ) -> Result<NewsPage, SourceError> {
        let url = match cursor {
            Some(next_url) => next_url,
            None => self.news_url(query)?.to_string(),
        };

        let response: NewsResponse = self.get_json(&url).await?;
        Ok(NewsPage {
            articles: response.results,
            next_cursor: response.next_url,
        })
    }
}
