use std::collections::HashMap;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::config::Config;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Stand-in for both the model API and the search API: vision calls get a
/// profile, text calls get two outfit descriptions, searches get one item.
pub fn fake_upstream() -> Router {
    Router::new()
        .route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                let has_images = body["messages"][1]["content"].is_array();
                let content = if has_images {
                    json!({
                        "Age": 20, "Occupation": "Student", "Location": "Urban Area",
                        "Hobbies": ["Gaming"], "Ethnicity": "Not Specified",
                        "Attire Style": "Casual", "Style Archetype": "Youthful/Trendy",
                        "Color Palette": "Black, Pink", "Influence": "Anime Culture"
                    })
                    .to_string()
                } else {
                    "['Graphic tee and shorts.', 'Pink hoodie and joggers.']".to_string()
                };
                Json(json!({ "choices": [{ "message": { "content": content } }] }))
            }),
        )
        .route(
            "/v1/images/generations",
            post(|| async { Json(json!({ "data": [{ "url": "https://img.example/o.png" }] })) }),
        )
        .route(
            "/search.json",
            get(|| async {
                Json(json!({ "shopping_results": [
                    { "title": "Tee", "link": "https://shop/tee", "price": "$15.00", "thumbnail": "https://t/tee" }
                ] }))
            }),
        )
}

/// Config pointed at a [`fake_upstream`] served from `base`.
pub fn fake_config(base: &str, overrides: &[(&str, &str)]) -> Config {
    let openai_base = format!("{base}/v1");
    let search = format!("{base}/search.json");
    let mut values = HashMap::from([
        ("OPENAI_API_KEY", "sk-test"),
        ("OPENAI_BASE_URL", openai_base.as_str()),
        ("SERPAPI_KEY", "serp-key"),
        ("SERPAPI_ENDPOINT", search.as_str()),
        ("NUM_OUTFITS", "2"),
        ("API_MAX_RETRIES", "0"),
    ]);
    for &(key, value) in overrides {
        values.insert(key, value);
    }
    Config::from_map(&values).unwrap()
}

/// A small valid PNG.
pub fn png_bytes() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 30, 90]));
    let mut out = std::io::Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}
