// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::api::{NewsQuery, NewsSource, MAX_PAGE_SIZE};
use crate::error::{PipelineError, PipelineResult};
use crate::models::RawRecord;

/// Result of one ingestion: the records in source order plus how the fetch
/// ended.
#[derive(Debug, Clone)]
pub struct Ingestion {
    pub records: Vec<RawRecord>,
    pub requested: usize,
    /// Set when a transient error cut the fetch short
    pub interruption: Option<String>,
}

impl Ingestion {
    pub fn summary(&self) -> String {
        let mut summary = format!("{} of {} fetched", self.records.len(), self.requested);
        if let Some(reason) = &self.interruption {
            summary.push_str(&format!(" (stopped early: {})", reason));
        }
        summary
    }
}

/// Optional published-date window.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Pull at most `limit` news records for `ticker`.
///
/// A rate limit or retryable network error ends the fetch early and keeps
/// what was accumulated, unless nothing was. Any other error is fatal.
pub async fn fetch_records<S>(
    source: &S,
    ticker: &str,
    limit: usize,
    range: DateRange,
) -> PipelineResult<Ingestion>
where
    S: NewsSource + ?Sized,
{
    if ticker.trim().is_empty() {
        return Err(PipelineError::Config("ticker must not be empty".to_string()));
    }
    if limit == 0 {
        return Err(PipelineError::Config("limit must be positive".to_string()));
    }

    let query = NewsQuery {
        ticker: ticker.to_string(),
        limit: limit.min(MAX_PAGE_SIZE),
        published_from: range.from,
        published_to: range.to,
    };

    let mut records: Vec<RawRecord> = Vec::with_capacity(limit.min(MAX_PAGE_SIZE));
    let mut cursor: Option<String> = None;
    let mut interruption = None;

    loop {
        let page = match source.news_page(&query, cursor.take()).await {
            Ok(page) => page,
            Err(e) if e.is_transient() => {
                if records.is_empty() {
                    return Err(PipelineError::TransientSource(e));
                }
                warn!(
                    ticker,
                    fetched = records.len(),
                    "Rate limit reached, continuing with partial results: {}",
                    e
                );
                interruption = Some(e.to_string());
                break;
            }
            Err(e) => {
                return Err(PipelineError::FatalSource {
                    ticker: ticker.to_string(),
                    fetched: records.len(),
                    source: e,
                });
            }
        };

        debug!(ticker, articles = page.articles.len(), "Fetched news page");
        let remaining = limit - records.len();
        let page_len = page.articles.len();
        records.extend(page.articles.into_iter().take(remaining).map(RawRecord::from));

        // An empty page with a cursor would loop forever.
        if records.len() >= limit || page_len == 0 {
            break;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(Ingestion {
        records,
        requested: limit,
        interruption,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockNewsSource, NewsPage};
    use crate::error::SourceError;
    use crate::models::NewsArticle;
    use mockall::Sequence;

    fn article(n: usize) -> NewsArticle {
        NewsArticle {
            id: Some(format!("id-{}", n)),
            title: Some(format!("Headline {}", n)),
            description: Some(format!("Body {}", n)),
            tickers: Some(vec!["AAPL".to_string()]),
            ..Default::default()
        }
    }

    fn page(range: std::ops::Range<usize>, next: Option<&str>) -> NewsPage {
        NewsPage {
            articles: range.map(article).collect(),
            next_cursor: next.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_fetch_five_records() -> anyhow::Result<()> {
        let mut source = MockNewsSource::new();
        source
            .expect_news_page()
            .withf(|query, cursor| query.ticker == "AAPL" && query.limit == 5 && cursor.is_none())
            .times(1)
            .returning(|_, _| Ok(page(0..5, Some("https://next"))));

        let ingestion = fetch_records(&source, "AAPL", 5, DateRange::default()).await?;

        assert_eq!(ingestion.records.len(), 5);
        assert_eq!(ingestion.requested, 5);
        assert!(ingestion.interruption.is_none());
        let ids: Vec<_> = ingestion
            .records
            .iter()
            .map(|r| r.id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["id-0", "id-1", "id-2", "id-3", "id-4"]);
        assert_eq!(ingestion.summary(), "5 of 5 fetched");
        Ok(())
    }

    #[tokio::test]
    async fn test_follows_cursor_and_truncates_to_limit() -> anyhow::Result<()> {
        let mut seq = Sequence::new();
        let mut source = MockNewsSource::new();
        source
            .expect_news_page()
            .withf(|_, cursor| cursor.is_none())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(page(0..3, Some("cursor-2"))));
        source
            .expect_news_page()
            .withf(|_, cursor| cursor.as_deref() == Some("cursor-2"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(page(3..6, Some("cursor-3"))));

        let ingestion = fetch_records(&source, "AAPL", 4, DateRange::default()).await?;

        assert_eq!(ingestion.records.len(), 4);
        assert_eq!(ingestion.records[3].id.as_deref(), Some("id-3"));
        Ok(())
    }

    #[tokio::test]
    async fn test_rate_limit_keeps_partial_results() -> anyhow::Result<()> {
        let mut seq = Sequence::new();
        let mut source = MockNewsSource::new();
        source
            .expect_news_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(page(0..3, Some("cursor-2"))));
        source
            .expect_news_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(SourceError::RateLimited("429 Too Many Requests".to_string())));

        let ingestion = fetch_records(&source, "AAPL", 5, DateRange::default()).await?;

        assert_eq!(ingestion.records.len(), 3);
        assert!(ingestion.interruption.is_some());
        assert!(ingestion.summary().starts_with("3 of 5 fetched"));
        Ok(())
    }

    #[tokio::test]
    async fn test_rate_limit_with_nothing_fetched_is_fatal() {
        let mut source = MockNewsSource::new();
        source
            .expect_news_page()
            .times(1)
            .returning(|_, _| Err(SourceError::RateLimited("429".to_string())));

        let result = fetch_records(&source, "AAPL", 5, DateRange::default()).await;
        assert!(matches!(result, Err(PipelineError::TransientSource(_))));
    }

    #[tokio::test]
    async fn test_other_error_is_fatal() {
        let mut source = MockNewsSource::new();
        source.expect_news_page().times(1).returning(|_, _| {
            Err(SourceError::Status {
                status: 401,
                body: "unknown API Key".to_string(),
            })
        });

        let err = fetch_records(&source, "AAPL", 5, DateRange::default())
            .await
            .unwrap_err();

        match &err {
            PipelineError::FatalSource { ticker, fetched, .. } => {
                assert_eq!(ticker, "AAPL");
                assert_eq!(*fetched, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("unknown API Key"));
    }

    #[tokio::test]
    async fn test_other_error_after_partial_results_is_fatal() {
        let mut seq = Sequence::new();
        let mut source = MockNewsSource::new();
        source
            .expect_news_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(page(0..2, Some("cursor-2"))));
        source
            .expect_news_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Err(SourceError::Status {
                    status: 500,
                    body: "internal".to_string(),
                })
            });

        let result = fetch_records(&source, "AAPL", 5, DateRange::default()).await;
        assert!(matches!(
            result,
            Err(PipelineError::FatalSource { fetched: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_exhausted_source_returns_fewer() -> anyhow::Result<()> {
        let mut source = MockNewsSource::new();
        source
            .expect_news_page()
            .times(1)
            .returning(|_, _| Ok(page(0..2, None)));

        let ingestion = fetch_records(&source, "AAPL", 5, DateRange::default()).await?;
        assert_eq!(ingestion.records.len(), 2);
        assert!(ingestion.interruption.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let source = MockNewsSource::new();
        assert!(matches!(
            fetch_records(&source, "  ", 5, DateRange::default()).await,
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(
            fetch_records(&source, "AAPL", 0, DateRange::default()).await,
            Err(PipelineError::Config(_))
        ));
    }
}
