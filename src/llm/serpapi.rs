use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::config::Config;
use crate::error::{StylistError, StylistResult};
use crate::utils::http::{get_http_client, truncate_for_log};
use crate::utils::retry::{send_with_retry, RetryPolicy};
use crate::utils::timing::log_api_timing;

const SERVICE: &str = "serpapi";
const SHOPPING_ENGINE: &str = "google_shopping";
const LENS_ENGINE: &str = "google_lens";

#[derive(Debug, Deserialize)]
struct ShoppingResponse {
    error: Option<String>,
    #[serde(default)]
    shopping_results: Vec<ShoppingResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShoppingResult {
    pub title: Option<String>,
    pub link: Option<String>,
    pub product_link: Option<String>,
    pub price: Option<String>,
    pub extracted_price: Option<f64>,
    pub thumbnail: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LensResponse {
    error: Option<String>,
    #[serde(default)]
    visual_matches: Vec<VisualMatch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisualMatch {
    pub title: Option<String>,
    pub link: Option<String>,
    pub source: Option<String>,
    pub price: Option<LensPrice>,
    pub thumbnail: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LensPrice {
    pub value: Option<String>,
    pub extracted_value: Option<f64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SerpApiClient {
    endpoint: String,
    api_key: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl SerpApiClient {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            endpoint: endpoint.trim().to_string(),
            api_key: api_key.trim().to_string(),
            timeout,
            retry,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.serpapi_endpoint,
            &config.serpapi_key,
            config.api_timeout(),
            RetryPolicy::from_config(config),
        )
    }

    async fn search<T: DeserializeOwned>(
        &self,
        engine: &'static str,
        params: &[(&str, String)],
    ) -> StylistResult<T> {
        if self.api_key.is_empty() {
            return Err(StylistError::Config("SERPAPI_KEY is not configured.".to_string()));
        }

        let mut query: Vec<(&str, String)> = vec![("engine", engine.to_string())];
        query.extend(params.iter().cloned());
        query.push(("api_key", self.api_key.clone()));

        let response = send_with_retry(SERVICE, &self.retry, || {
            get_http_client()
                .get(&self.endpoint)
                .query(&query)
                .timeout(self.timeout)
        })
        .await?;

        response
            .json::<T>()
            .await
            .map_err(|err| StylistError::malformed("search", format!("invalid {engine} body: {err}")))
    }

    pub async fn google_shopping(&self, query: &str, num: usize) -> StylistResult<Vec<ShoppingResult>> {
        if query.trim().is_empty() {
            return Err(StylistError::InvalidInput("query must not be empty".to_string()));
        }
        info!(
            "Calling SerpAPI {} with query: {}",
            SHOPPING_ENGINE,
            truncate_for_log(query, 200)
        );

        let params = [("q", query.to_string()), ("num", num.to_string())];
        let metadata = json!({ "num": num });
        let body: ShoppingResponse =
            log_api_timing(SERVICE, SHOPPING_ENGINE, "search", Some(metadata), || {
                self.search(SHOPPING_ENGINE, &params)
            })
            .await?;

        if let Some(error) = body.error {
            return no_results_or_error(error);
        }
        Ok(body.shopping_results)
    }

    pub async fn google_lens(&self, image_url: &str) -> StylistResult<Vec<VisualMatch>> {
        if image_url.trim().is_empty() {
            return Err(StylistError::InvalidInput("image url must not be empty".to_string()));
        }
        info!(
            "Calling SerpAPI {} with image: {}",
            LENS_ENGINE,
            truncate_for_log(image_url, 120)
        );

        let params = [("url", image_url.to_string())];
        let body: LensResponse = log_api_timing(SERVICE, LENS_ENGINE, "search", None, || {
            self.search(LENS_ENGINE, &params)
        })
        .await?;

        if let Some(error) = body.error {
            return no_results_or_error(error);
        }
        Ok(body.visual_matches)
    }
}

/// SerpAPI reports an empty result set through the `error` field; only other
/// messages are failures.
fn no_results_or_error<T>(error: String) -> StylistResult<Vec<T>> {
    if error.to_lowercase().contains("hasn't returned any results") {
        return Ok(Vec::new());
    }
    Err(StylistError::upstream(SERVICE, error))
}
