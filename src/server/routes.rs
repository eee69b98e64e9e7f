use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{ApiError, StylistError, StylistResult};
use crate::llm::media::{collect_image_files, load_image_file, ImageInput};
use crate::pipeline::items::Item;
use crate::pipeline::sample::{sample_outfits, sample_profile};
use crate::pipeline::StyleReport;
use crate::server::upload::{validate_upload, StagedUploads, UploadLimits};
use crate::state::AppState;
use crate::utils::timing::RequestTimer;

const IMAGES_FIELD: &str = "images";

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn root() -> Json<Value> {
    Json(json!({ "Hello": "World" }))
}

#[derive(Debug, Deserialize)]
pub struct ItemQuery {
    q: Option<String>,
}

pub async fn read_item(
    Path(item_id): Path<String>,
    Query(query): Query<ItemQuery>,
) -> ApiResult<Value> {
    let item_id: i64 = item_id.trim().parse().map_err(|_| {
        StylistError::InvalidInput(format!("item_id must be an integer, got '{item_id}'"))
    })?;
    Ok(Json(json!({ "item_id": item_id, "q": query.q })))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "item_search_mode": state.config().item_search_mode.as_str(),
    }))
}

async fn run_timed(
    state: &AppState,
    route: &str,
    images: Vec<ImageInput>,
) -> StylistResult<StyleReport> {
    let mut timer = RequestTimer::start(route, images.len());
    match state.stylist.run(images).await {
        Ok(report) => {
            timer.complete(
                "success",
                Some(format!(
                    "outfits={} items={}",
                    report.outfit_recommendations.len(),
                    report.items.len()
                )),
            );
            Ok(report)
        }
        Err(err) => {
            timer.complete("error", Some(err.to_string()));
            Err(err)
        }
    }
}

async fn load_all(paths: &[std::path::PathBuf]) -> StylistResult<Vec<ImageInput>> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        images.push(load_image_file(path).await?);
    }
    Ok(images)
}

/// Runs the pipeline on the images already sitting in the upload directory.
pub async fn generate_from_directory(State(state): State<AppState>) -> ApiResult<StyleReport> {
    let dir = state.config().upload_dir.clone();
    let paths = collect_image_files(&dir).await?;
    if paths.is_empty() {
        return Err(StylistError::InvalidInput(format!(
            "No JPEG or PNG images found in {}",
            dir.display()
        ))
        .into());
    }

    info!("Generating from {} image(s) in {}", paths.len(), dir.display());
    let images = load_all(&paths).await?;
    let report = run_timed(&state, "GET /generate", images).await?;
    Ok(Json(report))
}

pub async fn generate_from_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<StyleReport> {
    let config = state.config();
    let limits = UploadLimits {
        max_images: config.max_upload_images,
        max_image_bytes: config.max_image_bytes,
    };
    let mut staged = StagedUploads::new(&config.upload_dir).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| StylistError::InvalidInput(format!("Invalid multipart body: {err}")))?
    {
        if field.name() != Some(IMAGES_FIELD) {
            warn!("Ignoring unexpected multipart field {:?}", field.name());
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await.map_err(|err| {
            StylistError::InvalidInput(format!("Failed to read image '{file_name}': {err}"))
        })?;
        validate_upload(limits, staged.paths().len(), &file_name, &bytes)?;
        staged.stage(&file_name, &bytes).await?;
    }

    if staged.paths().is_empty() {
        return Err(StylistError::InvalidInput(format!(
            "No images uploaded; send one or more '{IMAGES_FIELD}' fields"
        ))
        .into());
    }

    let images = load_all(staged.paths()).await?;
    let report = run_timed(&state, "POST /generate", images).await?;
    Ok(Json(report))
}

/// Item search only, over the built-in sample outfits.
pub async fn generate_sample_items(State(state): State<AppState>) -> ApiResult<Vec<Item>> {
    let profile = sample_profile();
    let outfits = sample_outfits();
    info!(
        "Generating items for {} sample outfits ({} / {})",
        outfits.len(),
        profile.attire_style,
        profile.style_archetype
    );

    let mut timer = RequestTimer::start("GET /generate-items", 0);
    let items = match state.stylist.items_for(&outfits).await {
        Ok(items) => items,
        Err(err) => {
            timer.complete("error", Some(err.to_string()));
            return Err(err.into());
        }
    };
    timer.complete("success", Some(format!("items={}", items.len())));
    Ok(Json(items))
}
