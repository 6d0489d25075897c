use std::time::Duration;

use anyhow::{bail, Context, Result};
use breedscan_contracts::breeds::Breed;
use breedscan_contracts::recognition::HistoryRecord;
use breedscan_contracts::RecognitionError;
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::AUTHORIZATION;
use tracing::debug;

use super::{BreedQuery, BreedStore};
use crate::config::StoreConfig;

const BREEDS_TABLE: &str = "breeds";
const HISTORY_TABLE: &str = "recognition_history";
const STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for a Supabase project's PostgREST endpoint (`/rest/v1`).
pub struct RestStore {
    rest_base: String,
    anon_key: String,
    http: HttpClient,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            rest_base: format!("{}/rest/v1", config.url.trim_end_matches('/')),
            anon_key: config.anon_key.clone(),
            http: HttpClient::new(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.rest_base)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.anon_key))
            .timeout(STORE_TIMEOUT)
    }

    fn breed_query_params(query: BreedQuery) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        if query.order_by_name {
            params.push(("order".to_string(), "name.asc".to_string()));
        }
        if let Some(breed_type) = query.breed_type {
            params.push(("type".to_string(), format!("eq.{breed_type}")));
        }
        params
    }

    fn get_breeds(&self, query: BreedQuery) -> Result<Vec<Breed>> {
        let url = self.table_url(BREEDS_TABLE);
        let response = self
            .authorized(self.http.get(&url))
            .query(&Self::breed_query_params(query))
            .send()
            .with_context(|| format!("breed query failed ({url})"))?;
        let status = response.status();
        let body = response.text().context("breed response body read failed")?;
        if !status.is_success() {
            bail!("store returned {}: {}", status.as_u16(), truncate_text(&body, 256));
        }
        serde_json::from_str(&body).context("breed rows did not match the expected shape")
    }
}

impl BreedStore for RestStore {
    fn name(&self) -> &str {
        "supabase"
    }

    fn fetch_breeds(&self, query: BreedQuery) -> Result<Vec<Breed>, RecognitionError> {
        let breeds = self
            .get_breeds(query)
            .map_err(|err| RecognitionError::CatalogUnavailable(format!("{err:#}")))?;
        debug!(count = breeds.len(), ?query, "breed rows fetched");
        Ok(breeds)
    }

    fn insert_history(&self, record: &HistoryRecord) -> Result<()> {
        let url = self.table_url(HISTORY_TABLE);
        let response = self
            .authorized(self.http.post(&url))
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .with_context(|| format!("history insert failed ({url})"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!(
                "history insert rejected ({}): {}",
                status.as_u16(),
                truncate_text(&body, 256)
            );
        }
        Ok(())
    }

    fn recent_history(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let url = self.table_url(HISTORY_TABLE);
        let response = self
            .authorized(self.http.get(&url))
            .query(&[
                ("select", "*".to_string()),
                ("order", "recognition_date.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .with_context(|| format!("history query failed ({url})"))?;
        let status = response.status();
        let body = response.text().context("history response body read failed")?;
        if !status.is_success() {
            bail!("store returned {}: {}", status.as_u16(), truncate_text(&body, 256));
        }
        serde_json::from_str(&body).context("history rows did not match the expected shape")
    }
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
