//! HTTP client example
//!
//! Demonstrates:
//! - Default headers and a retry policy
//! - Saving facts about a fetched page
//! - Fetching several URLs concurrently with `fetch_all`

use crawlab_sdk::{Config, FetchOptions, HttpClient, RetryPolicy, logging};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::info("Starting HTTP crawl");

    let mut client = HttpClient::new(Duration::from_secs(30))?;
    client.set_header("User-Agent", "Crawlab/1.0 (Spider Bot)");
    client.set_header("Accept", "text/html,application/json");
    client.set_retry(RetryPolicy::fixed(3, Duration::from_secs(2)));

    let cancel = CancellationToken::new();

    // A single page
    let response = client.get(&cancel, "https://httpbin.org/get").await?;
    let url = response.url().to_string();
    let status = response.status().as_u16();
    let body = response.bytes().await?;

    crawlab_sdk::save_item(&json!({
        "url": url,
        "status_code": status,
        "content_len": body.len(),
    }))?;
    logging::info(format!("Page fetched: {} bytes", body.len()));

    // Several pages, bounded by the configured concurrency hint
    let urls = [
        "https://httpbin.org/status/200",
        "https://httpbin.org/status/404",
        "https://httpbin.org/delay/1",
    ];
    logging::info(format!("Fetching {} URLs...", urls.len()));

    let options = FetchOptions::from_config(&Config::from_env());
    let pages = client.fetch_all(&cancel, urls, &options).await?;

    let records: Vec<_> = pages
        .iter()
        .map(|page| {
            json!({
                "url": page.url,
                "status": page.status,
                "size": page.body.len(),
                "time": chrono::Utc::now().timestamp(),
            })
        })
        .collect();
    crawlab_sdk::save_batch(&records)?;

    logging::info(format!("Saved {} pages", records.len()));
    Ok(())
}
