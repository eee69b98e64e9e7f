use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::error::StylistResult;
use crate::llm::serpapi::{ShoppingResult, VisualMatch};
use crate::llm::SerpApiClient;
use crate::pipeline::outfits::OutfitRecommendation;

const SHOPPING_SOURCE: &str = "Google Shopping";
const LENS_SOURCE: &str = "Google Lens";
const MISSING_PRICE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemSearchMode {
    Shopping,
    Lens,
}

impl ItemSearchMode {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "shopping" | "text" => Some(Self::Shopping),
            "lens" | "visual" => Some(Self::Lens),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shopping => "shopping",
            Self::Lens => "lens",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub link: String,
    pub price: String,
    pub image: Option<String>,
    pub source: String,
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retailer: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn format_amount(amount: f64, currency: Option<&str>) -> String {
    match currency.map(str::trim).filter(|c| !c.is_empty()) {
        Some("$") | Some("USD") | None => format!("${amount:.2}"),
        Some(other) => format!("{amount:.2} {other}"),
    }
}

impl Item {
    pub fn from_shopping(result: ShoppingResult) -> Option<Self> {
        let link = non_empty(result.link).or_else(|| non_empty(result.product_link))?;
        let price = non_empty(result.price)
            .or_else(|| result.extracted_price.map(|amount| format_amount(amount, None)))
            .unwrap_or_else(|| MISSING_PRICE.to_string());
        let thumbnail = non_empty(result.thumbnail);
        Some(Self {
            name: non_empty(result.title).unwrap_or_else(|| link.clone()),
            link,
            price,
            image: thumbnail.clone(),
            source: SHOPPING_SOURCE.to_string(),
            thumbnail,
            retailer: non_empty(result.source),
        })
    }

    pub fn from_visual_match(result: VisualMatch) -> Option<Self> {
        let link = non_empty(result.link)?;
        let price = result
            .price
            .and_then(|price| {
                non_empty(price.value).or_else(|| {
                    price
                        .extracted_value
                        .map(|amount| format_amount(amount, price.currency.as_deref()))
                })
            })
            .unwrap_or_else(|| MISSING_PRICE.to_string());
        let thumbnail = non_empty(result.thumbnail);
        let retailer = non_empty(result.source);
        Some(Self {
            name: non_empty(result.title).unwrap_or_else(|| link.clone()),
            link,
            price,
            image: non_empty(result.image).or_else(|| thumbnail.clone()),
            source: retailer.clone().unwrap_or_else(|| LENS_SOURCE.to_string()),
            thumbnail,
            retailer,
        })
    }
}

/// What an outfit is searched by, or `None` when it has nothing usable.
fn search_query(mode: ItemSearchMode, outfit: &OutfitRecommendation) -> Option<String> {
    match mode {
        ItemSearchMode::Shopping => {
            let description = outfit.description.trim();
            (!description.is_empty()).then(|| description.to_string())
        }
        ItemSearchMode::Lens => {
            let url = outfit.url.trim();
            match Url::parse(url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Some(url.to_string()),
                _ => None,
            }
        }
    }
}

async fn search_outfit(
    client: &SerpApiClient,
    mode: ItemSearchMode,
    query: &str,
    limit: usize,
) -> StylistResult<Vec<Item>> {
    let items: Vec<Item> = match mode {
        ItemSearchMode::Shopping => client
            .google_shopping(query, limit)
            .await?
            .into_iter()
            .filter_map(Item::from_shopping)
            .take(limit)
            .collect(),
        ItemSearchMode::Lens => client
            .google_lens(query)
            .await?
            .into_iter()
            .filter_map(Item::from_visual_match)
            .take(limit)
            .collect(),
    };
    Ok(items)
}

/// Searches for items matching every usable outfit and concatenates the
/// results in outfit order.
pub async fn generate_items(
    client: &SerpApiClient,
    config: &Config,
    outfits: &[OutfitRecommendation],
) -> StylistResult<Vec<Item>> {
    let mode = config.item_search_mode;
    let queries: Vec<String> = outfits
        .iter()
        .enumerate()
        .filter_map(|(index, outfit)| {
            let query = search_query(mode, outfit);
            if query.is_none() {
                warn!("Skipping outfit {} with no usable {} query", index + 1, mode.as_str());
            }
            query
        })
        .collect();

    if queries.is_empty() {
        return Ok(Vec::new());
    }

    info!(
        "Searching items for {} outfit(s) via {}",
        queries.len(),
        mode.as_str()
    );
    let limit = config.max_items_per_outfit;
    let batches: Vec<Vec<Item>> = stream::iter(queries)
        .map(|query| async move { search_outfit(client, mode, &query, limit).await })
        .buffered(config.search_concurrency)
        .try_collect()
        .await?;

    Ok(batches.into_iter().flatten().collect())
}
