use anyhow::anyhow;
use recipe_merge::{config::Config, pipeline::RecipeMerger, MergeRecipeRequest, ProgressEvent};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: merge-cli <dish name> [classic|simplified|healthy] [allergen,allergen,...]";

/// Runs one merge in the foreground and prints the result as JSON.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let dish_name = args.next().ok_or_else(|| anyhow!(USAGE))?;
    let mut request = MergeRecipeRequest::new(dish_name);
    if let Some(mode) = args.next() {
        request.authenticity = mode.parse()?;
    }
    if let Some(list) = args.next() {
        request.allergens = list
            .split(',')
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
    }
    request.validate()?;

    let config = Config::from_env()?;
    let merger = RecipeMerger::from_config(&config)?;

    let on_progress = |event: ProgressEvent| info!("[{}] {}", event.stage.as_str(), event.message);
    let result = merger.run_with_deadline(&request, &on_progress).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
