// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

pub mod massive_client;

pub use massive_client::MassiveClient;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::SourceError;
use crate::models::NewsArticle;

/// Most results the news endpoint returns per page.
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct NewsQuery {
    pub ticker: String,
    /// Page size for the first request
    pub limit: usize,
    pub published_from: Option<NaiveDate>,
    pub published_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct NewsPage {
    pub articles: Vec<NewsArticle>,
    /// Opaque cursor for the following page, if any
    pub next_cursor: Option<String>,
}

/// Paged access to news articles for one ticker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NewsSource {
    /// Fetch the first page for `query` when `cursor` is `None`, otherwise
    /// the page the cursor points to.
    async fn news_page(
        &self,
        query: &NewsQuery,
        cursor: Option<String>,
    ) -> Result<NewsPage, SourceError>;
}
