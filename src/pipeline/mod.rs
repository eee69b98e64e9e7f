pub mod items;
pub mod outfits;
pub mod profile;
pub mod sample;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::error::StylistResult;
use crate::llm::media::{downscale_all, ImageInput};
use crate::llm::{OpenAiClient, SerpApiClient};
use items::Item;
use outfits::OutfitRecommendation;
use profile::CustomerProfile;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleReport {
    pub profile: CustomerProfile,
    pub outfit_recommendations: Vec<OutfitRecommendation>,
    pub items: Vec<Item>,
}

/// Runs photos through profile inference, outfit generation and item search.
#[derive(Debug, Clone)]
pub struct Stylist {
    config: Config,
    openai: OpenAiClient,
    search: SerpApiClient,
}

impl Stylist {
    pub fn new(config: Config) -> Self {
        let openai = OpenAiClient::from_config(&config);
        let search = SerpApiClient::from_config(&config);
        Self {
            config,
            openai,
            search,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self, images: Vec<ImageInput>) -> StylistResult<StyleReport> {
        self.run_with_outfits(images, self.config.num_outfits).await
    }

    pub async fn run_with_outfits(
        &self,
        images: Vec<ImageInput>,
        num_outfits: usize,
    ) -> StylistResult<StyleReport> {
        let images = downscale_all(images, self.config.image_max_dimension).await?;

        let profile = profile::generate_profile(&self.openai, &self.config, &images).await?;
        let outfit_recommendations =
            outfits::generate_outfits(&self.openai, &self.config, &profile, num_outfits).await?;
        let items = self.items_for(&outfit_recommendations).await?;

        info!(
            "Style report ready: outfits={} items={}",
            outfit_recommendations.len(),
            items.len()
        );
        Ok(StyleReport {
            profile,
            outfit_recommendations,
            items,
        })
    }

    pub async fn items_for(&self, outfits: &[OutfitRecommendation]) -> StylistResult<Vec<Item>> {
        items::generate_items(&self.search, &self.config, outfits).await
    }
}
