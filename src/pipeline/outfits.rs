use futures_util::stream::{self, StreamExt, TryStreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Config, OUTFIT_SYSTEM_PROMPT};
use crate::error::{StylistError, StylistResult};
use crate::llm::{ImageRequest, OpenAiClient};
use crate::pipeline::profile::CustomerProfile;
use crate::utils::http::truncate_for_log;

const STAGE: &str = "outfit descriptions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutfitRecommendation {
    pub url: String,
    pub description: String,
}

/// Parses a list of strings out of a model reply. Accepts a JSON array, a
/// list literal with single- or double-quoted items, or one item per line.
/// Each `[` is tried in turn, so bracketed prose before the list is skipped.
pub fn parse_description_list(text: &str) -> StylistResult<Vec<String>> {
    let bracketed = text.match_indices('[').find_map(|(start, _)| {
        let rest = &text[start..];
        let mut arrays = serde_json::Deserializer::from_str(rest).into_iter::<Vec<String>>();
        match arrays.next() {
            Some(Ok(items)) => Some(items),
            _ => parse_list_literal(rest),
        }
    });
    if let Some(items) = bracketed {
        return Ok(clean_items(items));
    }

    let items = parse_line_items(text);
    if items.is_empty() {
        return Err(StylistError::malformed(
            STAGE,
            format!("could not find a list in reply: {}", truncate_for_log(text, 200)),
        ));
    }
    Ok(items)
}

fn clean_items(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn skip_whitespace(chars: &[char], mut pos: usize) -> usize {
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    pos
}

fn read_quoted(chars: &[char], pos: usize) -> Option<(String, usize)> {
    let quote = *chars.get(pos)?;
    if quote != '\'' && quote != '"' {
        return None;
    }

    let mut out = String::new();
    let mut i = pos + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let escaped = *chars.get(i + 1)?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                i += 2;
            }
            c if c == quote => return Some((out, i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    None
}

/// Parses a `['a', "b", 'c' 'd',]` style literal at the start of `literal`,
/// ignoring anything after its closing bracket. Nothing is evaluated.
/// Adjacent string literals are concatenated.
fn parse_list_literal(literal: &str) -> Option<Vec<String>> {
    let chars: Vec<char> = literal.chars().collect();
    let mut pos = skip_whitespace(&chars, 0);
    if chars.get(pos) != Some(&'[') {
        return None;
    }
    pos += 1;

    let mut items = Vec::new();
    loop {
        pos = skip_whitespace(&chars, pos);
        match chars.get(pos)? {
            ']' => return Some(items),
            '\'' | '"' => {
                let mut item = String::new();
                while matches!(chars.get(pos), Some('\'') | Some('"')) {
                    let (part, next) = read_quoted(&chars, pos)?;
                    item.push_str(&part);
                    pos = skip_whitespace(&chars, next);
                }
                items.push(item);
                match chars.get(pos)? {
                    ',' => pos += 1,
                    ']' => return Some(items),
                    _ => return None,
                }
            }
            _ => return None,
        }
    }
}

static LIST_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(?:\d+[.)]|[-*•])\s+"?(.+?)"?,?$"#).expect("valid list item regex"));

fn parse_line_items(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| LIST_ITEM_RE.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|item| item.as_str().trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub fn build_description_request(profile: &CustomerProfile, num_outfits: usize) -> (String, String) {
    let system = OUTFIT_SYSTEM_PROMPT.replace("{num_outfits}", &num_outfits.to_string());
    let profile_text =
        serde_json::to_string_pretty(profile).unwrap_or_else(|_| format!("{profile:?}"));
    let user = format!("Profile:\n{profile_text}\n\nGenerate {num_outfits} outfit descriptions.");
    (system, user)
}

pub fn build_image_prompt(profile: &CustomerProfile, description: &str) -> String {
    format!(
        "Create a diverse outfit for someone with these characteristics:\n\
         - Age: {}\n\
         - Style: {}\n\
         - Style Archetype: {}\n\
         - Color Palette: {}\n\
         - Influences: {}\n\n\
         The outfit should be a full-body shot on a plain background, photorealistic, high quality fashion photography style.\n\
         Show the complete outfit including accessories. No human in the image, just the clothing arranged.\n\
         Specifically: {}",
        profile.age,
        profile.attire_style,
        profile.style_archetype,
        profile.color_palette_or_default(),
        profile.influence_or_default(),
        description.trim()
    )
}

pub async fn generate_outfit_descriptions(
    client: &OpenAiClient,
    config: &Config,
    profile: &CustomerProfile,
    num_outfits: usize,
) -> StylistResult<Vec<String>> {
    let (system, user) = build_description_request(profile, num_outfits);
    let reply = client
        .chat_text(&config.text_model, &system, &user, config.outfit_max_tokens)
        .await?;

    let descriptions = parse_description_list(&reply)?;
    if descriptions.len() != num_outfits {
        return Err(StylistError::malformed(
            STAGE,
            format!(
                "expected {} descriptions, got {}",
                num_outfits,
                descriptions.len()
            ),
        ));
    }
    Ok(descriptions)
}

pub async fn generate_outfits(
    client: &OpenAiClient,
    config: &Config,
    profile: &CustomerProfile,
    num_outfits: usize,
) -> StylistResult<Vec<OutfitRecommendation>> {
    let descriptions = generate_outfit_descriptions(client, config, profile, num_outfits).await?;
    info!(
        "Generating {} outfit image(s) with concurrency {}",
        descriptions.len(),
        config.image_concurrency
    );

    let prompts: Vec<String> = descriptions
        .iter()
        .map(|description| build_image_prompt(profile, description))
        .collect();
    let urls: Vec<String> = stream::iter(prompts)
        .map(|prompt| async move {
            debug!("Image prompt: {}", truncate_for_log(&prompt, 300));
            client
                .generate_image(ImageRequest {
                    model: &config.image_model,
                    prompt: &prompt,
                    size: &config.image_size,
                    quality: &config.image_quality,
                })
                .await
        })
        .buffered(config.image_concurrency)
        .try_collect()
        .await?;

    Ok(urls
        .into_iter()
        .zip(descriptions)
        .map(|(url, description)| OutfitRecommendation { url, description })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::pipeline::profile::parse_profile;
    use crate::utils::test_support::serve;

    fn profile() -> CustomerProfile {
        parse_profile(
            r#"{"Age": 20, "Occupation": "Student/Gamer", "Location": "Urban Area",
                "Hobbies": ["Gaming"], "Ethnicity": "Not Specified", "Attire Style": "Casual",
                "Style Archetype": "Youthful/Trendy", "Color Palette": "Black, Blue, Pink",
                "Influence": "Anime Culture"}"#,
        )
        .unwrap()
    }

    fn test_config(base: &str, outfits: &str) -> Config {
        let values = HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", base),
            ("NUM_OUTFITS", outfits),
            ("IMAGE_CONCURRENCY", "2"),
            ("API_MAX_RETRIES", "0"),
        ]);
        Config::from_map(&values).unwrap()
    }

    #[test]
    fn parses_json_arrays_inside_prose() {
        let reply = "Sure! Here you go:\n```json\n[\"A black tee with jeans.\", \"A pink hoodie.\"]\n```";
        assert_eq!(
            parse_description_list(reply).unwrap(),
            vec!["A black tee with jeans.", "A pink hoodie."]
        );
    }

    #[test]
    fn parses_single_quoted_list_literals() {
        let reply = r#"['A relaxed-fit flannel, perfect for a local caf\'e.', "A white crop top", 'A trendy ' 'bomber jacket',]"#;
        assert_eq!(
            parse_description_list(reply).unwrap(),
            vec![
                "A relaxed-fit flannel, perfect for a local caf'e.",
                "A white crop top",
                "A trendy bomber jacket",
            ]
        );
    }

    #[test]
    fn falls_back_to_numbered_lines() {
        let reply = "1. Oversized graphic tee with shorts.\n2) Layered hoodie look.\n- Bomber jacket outfit.";
        assert_eq!(
            parse_description_list(reply).unwrap(),
            vec![
                "Oversized graphic tee with shorts.",
                "Layered hoodie look.",
                "Bomber jacket outfit."
            ]
        );

        let quoted = "Here you go:\n1. \"Denim jacket look.\",\n2024 trends inspired these.\n2. \"Pleated skirt outfit.\"";
        assert_eq!(
            parse_description_list(quoted).unwrap(),
            vec!["Denim jacket look.", "Pleated skirt outfit."]
        );
    }

    #[test]
    fn skips_bracketed_prose_before_the_list() {
        let reply = "Here are 2 outfits [casual to dressed-up]:\n[\"A black tee.\", \"A blazer look.\"]\n[end]";
        assert_eq!(
            parse_description_list(reply).unwrap(),
            vec!["A black tee.", "A blazer look."]
        );

        let literal = "Sure [see below]: ['Denim jacket.', 'Linen shirt.'] (2 items)";
        assert_eq!(
            parse_description_list(literal).unwrap(),
            vec!["Denim jacket.", "Linen shirt."]
        );
    }

    #[test]
    fn rejects_replies_without_a_list() {
        assert!(parse_description_list("I'm not able to help with that.").is_err());
        assert!(parse_description_list("['unterminated]").is_err());
    }

    #[test]
    fn image_prompt_carries_profile_and_description() {
        let prompt = build_image_prompt(&profile(), "  A pink hoodie over a white shirt. ");
        assert!(prompt.contains("- Age: 20"));
        assert!(prompt.contains("- Style: Casual"));
        assert!(prompt.contains("- Color Palette: Black, Blue, Pink"));
        assert!(prompt.contains("- Influences: Anime Culture"));
        assert!(prompt.contains("No human in the image"));
        assert!(prompt.ends_with("Specifically: A pink hoodie over a white shirt."));
    }

    #[test]
    fn description_request_names_the_count() {
        let (system, user) = build_description_request(&profile(), 3);
        assert!(system.starts_with("Given a customer profile, generate 3 unique"));
        assert!(user.contains("\"Style Archetype\": \"Youthful/Trendy\""));
        assert!(user.ends_with("Generate 3 outfit descriptions."));
    }

    #[tokio::test]
    async fn generates_one_image_per_description_in_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let images = counter.clone();
        let router = Router::new()
            .route(
                "/chat/completions",
                post(|| async {
                    Json(json!({ "choices": [{ "message": {
                        "content": "[\"Outfit one.\", \"Outfit two.\", \"Outfit three.\"]"
                    } }] }))
                }),
            )
            .route(
                "/images/generations",
                post(move |Json(body): Json<Value>| {
                    let images = images.clone();
                    async move {
                        images.fetch_add(1, Ordering::SeqCst);
                        let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
                        // Finish the first request last to exercise ordering.
                        if prompt.ends_with("Outfit one.") {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        }
                        let slug = prompt.rsplit("Specifically: ").next().unwrap_or_default().replace(' ', "-");
                        Json(json!({ "data": [{ "url": format!("https://img.example/{slug}") }] }))
                    }
                }),
            );
        let base = serve(router).await;
        let config = test_config(&base, "3");
        let client = OpenAiClient::from_config(&config);

        let outfits = generate_outfits(&client, &config, &profile(), 3).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        let descriptions: Vec<_> = outfits.iter().map(|o| o.description.as_str()).collect();
        assert_eq!(descriptions, vec!["Outfit one.", "Outfit two.", "Outfit three."]);
        assert_eq!(outfits[0].url, "https://img.example/Outfit-one.");
        assert_eq!(outfits[2].url, "https://img.example/Outfit-three.");
    }

    #[tokio::test]
    async fn one_failed_image_fails_the_whole_stage() {
        let router = Router::new()
            .route(
                "/chat/completions",
                post(|| async {
                    Json(json!({ "choices": [{ "message": {
                        "content": "[\"Outfit one.\", \"Outfit two.\", \"Outfit three.\"]"
                    } }] }))
                }),
            )
            .route(
                "/images/generations",
                post(|Json(body): Json<Value>| async move {
                    let prompt = body["prompt"].as_str().unwrap_or_default();
                    if prompt.ends_with("Outfit two.") {
                        return (
                            StatusCode::BAD_REQUEST,
                            Json(json!({ "error": { "message": "content policy violation" } })),
                        );
                    }
                    (
                        StatusCode::OK,
                        Json(json!({ "data": [{ "url": "https://img.example/ok.png" }] })),
                    )
                }),
            );
        let base = serve(router).await;
        let config = test_config(&base, "3");
        let client = OpenAiClient::from_config(&config);

        let err = generate_outfits(&client, &config, &profile(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, StylistError::Upstream { service: "openai", .. }));
        assert!(err.to_string().contains("content policy violation"));
    }

    #[tokio::test]
    async fn wrong_description_count_is_malformed() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                Json(json!({ "choices": [{ "message": { "content": "[\"Only one.\"]" } }] }))
            }),
        );
        let base = serve(router).await;
        let config = test_config(&base, "5");
        let client = OpenAiClient::from_config(&config);

        let err = generate_outfit_descriptions(&client, &config, &profile(), 5)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "malformed outfit descriptions response: expected 5 descriptions, got 1"
        );
    }
}
