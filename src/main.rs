use std::path::PathBuf;

use anyhow::anyhow;
use dotenvy::dotenv;
use tracing::info;

mod config;
mod error;
mod llm;
mod pipeline;
mod server;
mod state;
mod utils;

use config::{CONFIG, MAX_OUTFITS};
use llm::media::{collect_image_files, load_image_file};
use pipeline::Stylist;
use state::AppState;
use utils::logging::init_logging;

#[derive(Debug, PartialEq)]
struct AnalyzeArgs {
    dir: PathBuf,
    num_outfits: Option<usize>,
}

fn analyze_usage() -> &'static str {
    "Usage: outfit_stylist analyze --dir <path> [--outfits <n>]"
}

fn parse_analyze_args(args: &[String]) -> anyhow::Result<Option<AnalyzeArgs>> {
    if args.get(1).map(|value| value.as_str()) != Some("analyze") {
        return Ok(None);
    }

    let mut dir: Option<PathBuf> = None;
    let mut num_outfits = None;

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--dir" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --dir"))?;
                dir = Some(PathBuf::from(value));
            }
            "--outfits" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --outfits"))?;
                let parsed = value
                    .parse::<usize>()
                    .map_err(|_| anyhow!("Invalid --outfits value: {value}"))?;
                if !(1..=MAX_OUTFITS).contains(&parsed) {
                    return Err(anyhow!("--outfits must be between 1 and {MAX_OUTFITS}"));
                }
                num_outfits = Some(parsed);
            }
            "--help" | "-h" => {
                return Err(anyhow!(analyze_usage()));
            }
            other => {
                return Err(anyhow!(
                    "Unknown analyze argument: {other}\n{}",
                    analyze_usage()
                ));
            }
        }
        index += 1;
    }

    let dir = dir.ok_or_else(|| anyhow!("--dir is required\n{}", analyze_usage()))?;
    Ok(Some(AnalyzeArgs { dir, num_outfits }))
}

async fn run_analyze(args: AnalyzeArgs) -> anyhow::Result<()> {
    let paths = collect_image_files(&args.dir).await?;
    if paths.is_empty() {
        return Err(anyhow!(
            "No JPEG or PNG images found in {}",
            args.dir.display()
        ));
    }
    info!("Analyzing {} image(s) from {}", paths.len(), args.dir.display());

    let mut images = Vec::with_capacity(paths.len());
    for path in &paths {
        images.push(load_image_file(path).await?);
    }

    let stylist = Stylist::new(CONFIG.clone());
    let num_outfits = args.num_outfits.unwrap_or(CONFIG.num_outfits);
    let report = stylist.run_with_outfits(images, num_outfits).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let _guards = init_logging(&CONFIG.log_level, &CONFIG.log_dir);

    let args: Vec<String> = std::env::args().collect();
    if let Some(analyze_args) = parse_analyze_args(&args)? {
        return run_analyze(analyze_args).await;
    }
    if args.len() > 1 {
        return Err(anyhow!(
            "Unknown command: {}\n{}\nRun without arguments to start the server.",
            args[1],
            analyze_usage()
        ));
    }

    info!(
        "Starting outfit stylist on {} (search mode: {}, outfits: {})",
        CONFIG.bind_addr,
        CONFIG.item_search_mode.as_str(),
        CONFIG.num_outfits
    );
    let state = AppState::new(Stylist::new(CONFIG.clone()));
    server::run(state).await
}
