use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::FlixConfig;
use crate::error::FetchError;
use crate::fetcher::DataFetcher;
use crate::models::{Credits, Genre, Item, ListKey, MovieDetail};

#[derive(Debug, Deserialize)]
struct ResultsEnvelope {
    results: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct GenresEnvelope {
    genres: Vec<Genre>,
}

/// [`DataFetcher`] backed by the TMDB v3 REST API.
#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
    sort_by: String,
    request_timeout: Duration,
    toggle_latency: Duration,
}

impl TmdbClient {
    pub fn new(client: Client, config: &FlixConfig) -> Result<Self, FetchError> {
        Ok(Self {
            client,
            base_url: Url::parse(&config.api.base_url)?,
            access_token: config.api.access_token.clone(),
            sort_by: config.api.sort_by.clone(),
            request_timeout: config.api.request_timeout(),
            toggle_latency: config.favorites.toggle_latency(),
        })
    }

    pub async fn genres(&self) -> Result<Vec<Genre>, FetchError> {
        let envelope: GenresEnvelope = self.get(&["3", "genre", "movie", "list"], &[]).await?;
        Ok(envelope.genres)
    }

    pub async fn movie(&self, movie_id: &str) -> Result<Item, FetchError> {
        self.get(&["3", "movie", movie_id], &[]).await
    }

    pub async fn credits(&self, movie_id: &str) -> Result<Credits, FetchError> {
        self.get(&["3", "movie", movie_id, "credits"], &[]).await
    }

    /// Movie, credits and recommendations fetched together; any failure
    /// fails the whole detail.
    pub async fn movie_detail(&self, movie_id: &str) -> Result<MovieDetail, FetchError> {
        let (movie, credits, recommendations) = tokio::try_join!(
            self.movie(movie_id),
            self.credits(movie_id),
            self.recommendations(movie_id),
        )?;
        Ok(MovieDetail {
            movie,
            credits,
            recommendations,
        })
    }

    pub async fn recommendations(&self, movie_id: &str) -> Result<Vec<Item>, FetchError> {
        let envelope: ResultsEnvelope = self
            .get(&["3", "movie", movie_id, "recommendations"], &[])
            .await?;
        Ok(envelope.results)
    }

    pub async fn search(&self, query: &str, page: u32) -> Result<Vec<Item>, FetchError> {
        let page = page.to_string();
        let envelope: ResultsEnvelope = self
            .get(&["3", "search", "movie"], &[("query", query), ("page", page.as_str())])
            .await?;
        Ok(envelope.results)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let url = self.endpoint(segments)?;
        debug!(url = %url, "tmdb request");
        let mut request = self
            .client
            .get(url.clone())
            .query(query)
            .timeout(self.request_timeout);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl DataFetcher for TmdbClient {
    async fn fetch_page(&self, key: &ListKey, page: u32) -> Result<Vec<Item>, FetchError> {
        let page_param = page.to_string();
        let envelope: ResultsEnvelope = match key {
            ListKey::Category(category) => {
                self.get(
                    &["3", "movie", category.as_str()],
                    &[("page", page_param.as_str()), ("sort_by", self.sort_by.as_str())],
                )
                .await?
            }
            ListKey::Genre(genre) => {
                self.get(
                    &["3", "discover", "movie"],
                    &[
                        ("with_genres", genre.as_str()),
                        ("page", page_param.as_str()),
                        ("sort_by", self.sort_by.as_str()),
                    ],
                )
                .await?
            }
            ListKey::Search(query) => return self.search(query, page).await,
        };
        Ok(envelope.results)
    }

    async fn fetch_by_key(&self, key: &str) -> Result<Vec<Item>, FetchError> {
        self.search(key, 1).await
    }

    async fn perform_toggle_round_trip(&self) -> Result<(), FetchError> {
        tokio::time::sleep(self.toggle_latency).await;
        Ok(())
    }
}
