pub mod media;
pub mod openai;
pub mod serpapi;

pub use openai::{ImageRequest, OpenAiClient};
pub use serpapi::SerpApiClient;
