use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::{Config, PROFILE_SYSTEM_PROMPT};
use crate::error::{StylistError, StylistResult};
use crate::llm::media::ImageInput;
use crate::llm::OpenAiClient;
use crate::utils::http::truncate_for_log;

const STAGE: &str = "profile";

pub const REQUIRED_FIELDS: [&str; 6] = [
    "Age",
    "Occupation",
    "Location",
    "Ethnicity",
    "Attire Style",
    "Style Archetype",
];

pub const ATTIRE_STYLES: [&str; 6] = [
    "Casual",
    "Business Casual",
    "Smart Casual",
    "Business",
    "Streetwear",
    "Vintage",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    #[serde(rename = "Age", deserialize_with = "deserialize_age")]
    pub age: u32,
    #[serde(rename = "Occupation", deserialize_with = "deserialize_text")]
    pub occupation: String,
    #[serde(rename = "Location", deserialize_with = "deserialize_text")]
    pub location: String,
    #[serde(rename = "Hobbies", default, deserialize_with = "deserialize_list")]
    pub hobbies: Vec<String>,
    #[serde(rename = "Ethnicity", deserialize_with = "deserialize_text")]
    pub ethnicity: String,
    #[serde(rename = "Attire Style", deserialize_with = "deserialize_text")]
    pub attire_style: String,
    #[serde(rename = "Style Archetype", deserialize_with = "deserialize_text")]
    pub style_archetype: String,
    #[serde(
        rename = "Color Palette",
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub color_palette: Option<String>,
    #[serde(
        rename = "Influence",
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub influence: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CustomerProfile {
    pub fn color_palette_or_default(&self) -> &str {
        self.color_palette.as_deref().unwrap_or("Not specified")
    }

    pub fn influence_or_default(&self) -> &str {
        self.influence.as_deref().unwrap_or("Not specified")
    }

    pub fn has_known_attire_style(&self) -> bool {
        ATTIRE_STYLES
            .iter()
            .any(|style| style.eq_ignore_ascii_case(self.attire_style.trim()))
    }
}

fn deserialize_age<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;
    let age = match &value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|v| *v >= 0.0).map(|v| v.round() as u64)),
        Value::String(text) => {
            let digits: String = text
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse::<u64>().ok()
        }
        _ => None,
    };
    age.and_then(|age| u32::try_from(age).ok())
        .ok_or_else(|| D::Error::custom(format!("Age must be an integer, got {value}")))
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.trim().to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.into_iter().filter_map(value_to_text).collect();
            Some(parts.join(", "))
        }
        other => Some(other.to_string()),
    }
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_text(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn deserialize_optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_text(Value::deserialize(deserializer)?).filter(|text| !text.is_empty()))
}

fn deserialize_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(value_to_text).collect(),
        Value::String(text) => text
            .split(',')
            .map(|part| part.trim().to_string())
            .collect(),
        _ => Vec::new(),
    };
    Ok(items.into_iter().filter(|item| !item.is_empty()).collect())
}

/// Finds the first `{...}` span that parses as a JSON object, skipping
/// markdown fences, prose and stray braces around it.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(Value::Object(object))) => Some(object),
            _ => None,
        }
    })
}

pub fn parse_profile(text: &str) -> StylistResult<CustomerProfile> {
    let object = extract_json_object(text).ok_or_else(|| {
        StylistError::malformed(
            STAGE,
            format!("no JSON object in reply: {}", truncate_for_log(text, 200)),
        )
    })?;

    for field in REQUIRED_FIELDS {
        if object.get(field).map_or(true, Value::is_null) {
            return Err(StylistError::malformed(
                STAGE,
                format!("Missing required field: {field}"),
            ));
        }
    }

    let profile: CustomerProfile = serde_json::from_value(Value::Object(object))
        .map_err(|err| StylistError::malformed(STAGE, err.to_string()))?;

    if !profile.has_known_attire_style() {
        warn!(
            "Profile attire style '{}' is not one of {:?}",
            profile.attire_style, ATTIRE_STYLES
        );
    }
    Ok(profile)
}

pub async fn generate_profile(
    client: &OpenAiClient,
    config: &Config,
    images: &[ImageInput],
) -> StylistResult<CustomerProfile> {
    if images.is_empty() {
        return Err(StylistError::InvalidInput(
            "At least one image is required to build a profile".to_string(),
        ));
    }

    info!("Generating customer profile from {} image(s)", images.len());
    let reply = client
        .chat_with_images(
            &config.vision_model,
            PROFILE_SYSTEM_PROMPT,
            images,
            config.profile_max_tokens,
        )
        .await?;

    let profile = parse_profile(&reply)?;
    info!(
        "Profile: age={} attire_style={} archetype={}",
        profile.age, profile.attire_style, profile.style_archetype
    );
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FENCED_REPLY: &str = "Here is the profile:\n```json\n{\n  \"Age\": 28,\n  \"Occupation\": \"Graphic Designer\",\n  \"Location\": \"Portland, Oregon\",\n  \"Hobbies\": [\"Hiking\", \"Photography\"],\n  \"Ethnicity\": \"Not Specified\",\n  \"Attire Style\": \"Smart Casual\",\n  \"Style Archetype\": \"Creative\",\n  \"Color Palette\": \"Earth tones\",\n  \"Influence\": \"Pacific Northwest outdoors\",\n  \"Annual Income\": 60000\n}\n```";

    #[test]
    fn parses_fenced_reply_and_keeps_extra_fields() {
        let profile = parse_profile(FENCED_REPLY).unwrap();
        assert_eq!(profile.age, 28);
        assert_eq!(profile.hobbies, vec!["Hiking", "Photography"]);
        assert_eq!(profile.attire_style, "Smart Casual");
        assert_eq!(profile.color_palette_or_default(), "Earth tones");
        assert_eq!(profile.extra["Annual Income"], 60000);

        let round_trip = serde_json::to_value(&profile).unwrap();
        assert_eq!(round_trip["Attire Style"], "Smart Casual");
        assert_eq!(round_trip["Annual Income"], 60000);
    }

    #[test]
    fn reports_the_first_missing_required_field() {
        let err = parse_profile(r#"{"Age": 20, "Occupation": "Student", "Location": "Urban"}"#)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "malformed profile response: Missing required field: Ethnicity"
        );
    }

    #[test]
    fn tolerates_loose_model_typing() {
        let reply = r#"{
            "Age": "35 years",
            "Occupation": "Investment Banker",
            "Location": "New York, New York",
            "Hobbies": "Golf, Fine Dining",
            "Ethnicity": "Caucasian",
            "Attire Style": "Business",
            "Style Archetype": "Classic",
            "Color Palette": ["black", "white", "grey"]
        }"#;
        let profile = parse_profile(reply).unwrap();
        assert_eq!(profile.age, 35);
        assert_eq!(profile.hobbies, vec!["Golf", "Fine Dining"]);
        assert_eq!(profile.color_palette.as_deref(), Some("black, white, grey"));
        assert_eq!(profile.influence_or_default(), "Not specified");
    }

    #[test]
    fn rejects_non_json_and_bad_age() {
        assert!(matches!(
            parse_profile("I cannot identify people in images."),
            Err(StylistError::MalformedResponse { .. })
        ));
        let bad_age = r#"{"Age": "unknown", "Occupation": "a", "Location": "b", "Ethnicity": "c", "Attire Style": "Casual", "Style Archetype": "d"}"#;
        assert!(parse_profile(bad_age).is_err());
    }

    #[test]
    fn skips_braces_in_surrounding_prose() {
        let reply = "Notes {based on 3 photos}:\n```json\n{\"Age\": 41, \"Occupation\": \"Chef\", \"Location\": \"Lyon\", \"Ethnicity\": \"Not Specified\", \"Attire Style\": \"Smart Casual\", \"Style Archetype\": \"Classic\"}\n```\nLet me know {if} you need more.";
        let profile = parse_profile(reply).unwrap();
        assert_eq!(profile.age, 41);
        assert_eq!(profile.occupation, "Chef");
    }

    #[test]
    fn null_required_field_counts_as_missing() {
        let reply = r#"{"Age": 20, "Occupation": null, "Location": "b", "Ethnicity": "c", "Attire Style": "Casual", "Style Archetype": "d"}"#;
        let err = parse_profile(reply).unwrap_err();
        assert!(err.to_string().ends_with("Missing required field: Occupation"));
    }

    #[test]
    fn flags_unknown_attire_styles() {
        let reply = r#"{"Age": 20, "Occupation": "a", "Location": "b", "Ethnicity": "c", "Attire Style": "Gothic", "Style Archetype": "d"}"#;
        let profile = parse_profile(reply).unwrap();
        assert!(!profile.has_known_attire_style());
    }
}
