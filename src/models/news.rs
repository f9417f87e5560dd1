// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// News article as returned by `/v2/reference/news`. Every field may be
/// missing or null.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[allow(dead_code)]
pub struct NewsArticle {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub published_utc: Option<String>,
    #[serde(default)]
    pub tickers: Option<Vec<String>>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub article_url: Option<String>,
    // Add catch-all for other fields we don't care about
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[allow(dead_code)]
pub struct NewsResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub results: Vec<NewsArticle>,
    #[serde(default)]
    pub next_url: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// One news article normalized at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRecord {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// ISO-8601
    pub published_at: Option<String>,
    pub tickers: Vec<String>,
    pub author: Option<String>,
    pub url: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Every string field that is missing, null or whitespace-only becomes
/// `None`. Non-blank values are kept as sent.
impl From<NewsArticle> for RawRecord {
    fn from(article: NewsArticle) -> Self {
        Self {
            id: non_blank(article.id),
            title: non_blank(article.title),
            description: non_blank(article.description),
            published_at: non_blank(article.published_utc),
            tickers: article.tickers.unwrap_or_default(),
            author: non_blank(article.author),
            url: non_blank(article.article_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_full_article() -> anyhow::Result<()> {
        let json = r#"{
            "id": "8ec638777ca03b553ae516761c2a22ba2fdd2f37befae3ab6fdab74e9e5193eb",
            "publisher": {"name": "The Motley Fool"},
            "title": "Apple ships new iPhone",
            "author": "Jane Doe",
            "published_utc": "2025-02-01T13:00:00Z",
            "article_url": "https://example.com/apple",
            "tickers": ["AAPL", "MSFT"],
            "description": "Shipments rose.",
            "keywords": ["iphone"]
        }"#;
        let article: NewsArticle = serde_json::from_str(json)?;
        assert!(article.extra.contains_key("publisher"));

        let record = RawRecord::from(article);
        assert_eq!(record.title.as_deref(), Some("Apple ships new iPhone"));
        assert_eq!(record.description.as_deref(), Some("Shipments rose."));
        assert_eq!(record.published_at.as_deref(), Some("2025-02-01T13:00:00Z"));
        assert_eq!(record.tickers, vec!["AAPL", "MSFT"]);
        assert_eq!(record.author.as_deref(), Some("Jane Doe"));
        assert_eq!(record.url.as_deref(), Some("https://example.com/apple"));
        Ok(())
    }

    #[test]
    fn test_normalize_sparse_article() -> anyhow::Result<()> {
        let article: NewsArticle =
            serde_json::from_str(r#"{"title": null, "tickers": null, "author": ""}"#)?;
        let record = RawRecord::from(article);

        assert_eq!(record, RawRecord::default());
        Ok(())
    }

    #[test]
    fn test_blank_strings_become_none() -> anyhow::Result<()> {
        let article: NewsArticle = serde_json::from_str(
            r#"{"id": " ", "title": "", "description": "  \n", "published_utc": "",
                "author": "\t", "article_url": " ", "tickers": []}"#,
        )?;
        let record = RawRecord::from(article);

        assert_eq!(record, RawRecord::default());
        Ok(())
    }

    #[test]
    fn test_non_blank_values_kept_as_sent() -> anyhow::Result<()> {
        let article: NewsArticle =
            serde_json::from_str(r#"{"title": " Apple ", "description": "Up 3%."}"#)?;
        let record = RawRecord::from(article);

        assert_eq!(record.title.as_deref(), Some(" Apple "));
        assert_eq!(record.description.as_deref(), Some("Up 3%."));
        Ok(())
    }

    #[test]
    fn test_news_response_without_results() -> anyhow::Result<()> {
        let response: NewsResponse =
            serde_json::from_str(r#"{"status": "OK", "request_id": "x", "count": 0}"#)?;
        assert!(response.results.is_empty());
        assert!(response.next_url.is_none());
        Ok(())
    }
}
