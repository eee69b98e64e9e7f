//! Built-in profile and outfits used by `GET /generate-items`, so the item
//! stage can be exercised without spending vision or image-generation calls.

use serde_json::Map;

use crate::pipeline::outfits::OutfitRecommendation;
use crate::pipeline::profile::CustomerProfile;

const SAMPLE_IMAGE_BASE: &str =
    "https://oaidalleapiprodscus.blob.core.windows.net/private/org-aVDulKeGtpr1CBgZXlvIY56M/user-uWU7fTePdltLDans7xQVlRIR";

const SAMPLE_OUTFITS: [(&str, &str); 5] = [
    (
        "img-8dPXd0hqp3Nwe5IHNXTIhprB.png",
        "A comfortable black oversized graphic tee featuring a popular anime character paired with distressed denim shorts, perfect for a casual day at campus or hanging out with friends.",
    ),
    (
        "img-EPqS9NKd63GBJ16pnR8yhX6V.png",
        "A vibrant pink hoodie layered over a fitted white long-sleeve shirt, combined with black joggers and white sneakers, ideal for a cozy gaming marathon or a casual stroll in the urban area.",
    ),
    (
        "img-uda2WBxaxc1pzPtAgW7tgJR2.png",
        "A trendy black bomber jacket over a blue anime-printed t-shirt, matched with skinny jeans and chunky high-top sneakers, suitable for a night out at a cosplay event or anime convention.",
    ),
    (
        "img-YDgpJymWOr11GHdLcvKtpnCH.png",
        "A stylish white crop top with subtle pink accents, paired with a high-waisted black skirt and combat boots, making it a great outfit for a lunch date or attending a themed party.",
    ),
    (
        "img-gwOy0Tsxsb0qVDwKF9k9QGhp.png",
        "A relaxed-fit blue flannel shirt worn over a fitted graphic tee, teamed with black leggings and ankle boots, perfect for an easygoing day spent catching up on your favorite anime or hanging out at a local café.",
    ),
];

pub fn sample_profile() -> CustomerProfile {
    CustomerProfile {
        age: 20,
        occupation: "Student/Gamer".to_string(),
        location: "Urban Area".to_string(),
        hobbies: vec![
            "Gaming".to_string(),
            "Anime/Manga".to_string(),
            "Cosplay".to_string(),
        ],
        ethnicity: "Not Specified".to_string(),
        attire_style: "Casual".to_string(),
        style_archetype: "Youthful/Trendy".to_string(),
        color_palette: Some("Black, Blue, Pink, White".to_string()),
        influence: Some("Anime Culture".to_string()),
        extra: Map::new(),
    }
}

pub fn sample_outfits() -> Vec<OutfitRecommendation> {
    SAMPLE_OUTFITS
        .iter()
        .map(|(file, description)| OutfitRecommendation {
            url: format!("{SAMPLE_IMAGE_BASE}/{file}"),
            description: description.to_string(),
        })
        .collect()
}
