use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use tracing::warn;

use crate::pipeline::items::ItemSearchMode;

pub const MAX_OUTFITS: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub frontend_origin: String,
    pub upload_dir: PathBuf,
    pub max_upload_images: usize,
    pub max_image_bytes: usize,
    pub image_max_dimension: u32,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub vision_model: String,
    pub text_model: String,
    pub profile_max_tokens: u32,
    pub outfit_max_tokens: u32,
    pub image_model: String,
    pub image_size: String,
    pub image_quality: String,
    pub num_outfits: usize,
    pub image_concurrency: usize,
    pub serpapi_key: String,
    pub serpapi_endpoint: String,
    pub item_search_mode: ItemSearchMode,
    pub search_concurrency: usize,
    pub max_items_per_outfit: usize,
    pub api_max_retries: usize,
    pub api_retry_base_delay_ms: u64,
    pub api_timeout_seconds: u64,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

struct Lookup<'a> {
    source: &'a dyn Fn(&str) -> Option<String>,
}

impl Lookup<'_> {
    fn raw(&self, name: &str) -> Option<String> {
        (self.source)(name)
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.raw(name).unwrap_or_else(|| default.to_string())
    }

    fn u64(&self, name: &str, default: u64) -> u64 {
        self.raw(name)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(default)
    }

    fn u32(&self, name: &str, default: u32) -> u32 {
        self.raw(name)
            .and_then(|value| value.trim().parse::<u32>().ok())
            .unwrap_or(default)
    }

    fn usize(&self, name: &str, default: usize) -> usize {
        self.raw(name)
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(default)
    }
}

fn clamp_outfits(value: usize) -> usize {
    if value == 0 || value > MAX_OUTFITS {
        warn!(
            "NUM_OUTFITS={} is outside 1..={}; clamping.",
            value, MAX_OUTFITS
        );
    }
    value.clamp(1, MAX_OUTFITS)
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(source: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = Lookup { source: &source };

        let bind_raw = lookup.string("BIND_ADDR", "0.0.0.0:8000");
        let bind_addr = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|err| anyhow!("Invalid BIND_ADDR '{bind_raw}': {err}"))?;

        let mode_raw = lookup.string("ITEM_SEARCH_MODE", "shopping");
        let item_search_mode = ItemSearchMode::from_str(&mode_raw).ok_or_else(|| {
            anyhow!("Invalid ITEM_SEARCH_MODE '{mode_raw}': expected 'shopping' or 'lens'")
        })?;

        Ok(Config {
            log_level: lookup.string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: PathBuf::from(lookup.string("LOG_DIR", "logs")),
            bind_addr,
            frontend_origin: lookup
                .string("FRONTEND_ORIGIN", "http://localhost:3000")
                .trim()
                .trim_end_matches('/')
                .to_string(),
            upload_dir: PathBuf::from(lookup.string("UPLOAD_DIR", "img")),
            max_upload_images: lookup.usize("MAX_UPLOAD_IMAGES", 10).max(1),
            max_image_bytes: lookup.usize("MAX_IMAGE_BYTES", 10 * 1024 * 1024).max(1),
            image_max_dimension: lookup.u32("IMAGE_MAX_DIMENSION", 2048),
            openai_api_key: lookup.string("OPENAI_API_KEY", ""),
            openai_base_url: lookup.string("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            vision_model: lookup.string("VISION_MODEL", "gpt-4o-mini"),
            text_model: lookup.string("TEXT_MODEL", "gpt-4o-mini"),
            profile_max_tokens: lookup.u32("PROFILE_MAX_TOKENS", 1000),
            outfit_max_tokens: lookup.u32("OUTFIT_MAX_TOKENS", 500),
            image_model: lookup.string("IMAGE_MODEL", "dall-e-3"),
            image_size: lookup.string("IMAGE_SIZE", "1024x1024"),
            image_quality: lookup.string("IMAGE_QUALITY", "standard"),
            num_outfits: clamp_outfits(lookup.usize("NUM_OUTFITS", 5)),
            image_concurrency: lookup.usize("IMAGE_CONCURRENCY", 3).max(1),
            serpapi_key: lookup.string("SERPAPI_KEY", ""),
            serpapi_endpoint: lookup.string("SERPAPI_ENDPOINT", "https://serpapi.com/search.json"),
            item_search_mode,
            search_concurrency: lookup.usize("SEARCH_CONCURRENCY", 2).max(1),
            max_items_per_outfit: lookup.usize("MAX_ITEMS_PER_OUTFIT", 10).max(1),
            api_max_retries: lookup.usize("API_MAX_RETRIES", 2),
            api_retry_base_delay_ms: lookup.u64("API_RETRY_BASE_DELAY_MS", 500),
            api_timeout_seconds: lookup.u64("API_TIMEOUT_SECONDS", 120).max(1),
        })
    }

    pub fn from_map(values: &HashMap<&str, &str>) -> Result<Self> {
        Self::from_lookup(|name| values.get(name).map(|value| value.to_string()))
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_seconds)
    }
}

pub const PROFILE_SYSTEM_PROMPT: &str = r#"Analyze the provided images and create one detailed customer profile.
Focus on visual cues to determine age, occupation, location, ethnicity, style, and other characteristics.
Provide the response in a JSON format, without the code block, with the following fields:
- Age (integer)
- Occupation (string)
- Location (string, based on visual context)
- Hobbies (array of strings)
- Ethnicity (string)
- Attire Style (one of: Casual, Business Casual, Smart Casual, Business, Streetwear, Vintage)
- Style Archetype (string)
- Color Palette (string)
- Influence (string)

example response:
{
"Age": 20,
"Occupation": "Student/Artist",
"Location": "Urban Area",
"Hobbies": ["Gaming", "Drawing", "Anime/Manga"],
"Ethnicity": "Not Specified",
"Attire Style": "Casual",
"Style Archetype": "Youthful/Trendy",
"Color Palette": "Black, Blue, Pink",
"Influence": "Anime Culture"
}"#;

pub const OUTFIT_SYSTEM_PROMPT: &str = "Given a customer profile, generate {num_outfits} unique outfit descriptions.\nEach description should be 1-2 sentences that describe the type of outfit and its purpose.\nConsider the person's age, style preferences, and influences.\nFocus on creating a range from casual to more dressed up while staying true to their aesthetic.\nReturn just the descriptions as a JSON array of strings, no additional formatting.";
