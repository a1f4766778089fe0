//! Simple example
//!
//! Saves ten records with the free functions, no spider involved:
//! - One frame per record on stdout
//! - Diagnostics on stderr

use crawlab_sdk::logging;
use serde_json::json;

fn main() {
    logging::info("Starting crawl");

    for i in 1..=10u8 {
        let title = format!("Example {}", char::from(b'A' + i - 1));
        let record = json!({
            "id": i,
            "title": title,
            "url": format!("https://example.com/{i}"),
        });

        if let Err(e) = crawlab_sdk::save_item(&record) {
            logging::error(format!("Failed to save record: {e}"));
            continue;
        }
        logging::info(format!("Saved record #{i}: {title}"));
    }

    logging::info("Crawl finished");
}
