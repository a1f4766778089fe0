//! Batch saving example
//!
//! Sends many records per frame instead of one frame per record.

use crawlab_sdk::logging;
use serde::Serialize;

#[derive(Serialize)]
struct Item {
    id: usize,
    title: String,
    url: String,
    category: &'static str,
}

fn main() {
    logging::info("Starting batch crawl");

    // One frame with 100 records
    let items: Vec<Item> = (1..=100)
        .map(|id| Item {
            id,
            title: format!("Batch Item {id}"),
            url: format!("https://example.com/batch/{id}"),
            category: "batch",
        })
        .collect();

    logging::info(format!("Saving {} records in one frame...", items.len()));
    if let Err(e) = crawlab_sdk::save_batch(&items) {
        logging::error(format!("Batch save failed: {e}"));
        return;
    }
    logging::info("Batch saved");

    // A large result set in chunks of 100
    let total = 1000;
    let chunk_size = 100;
    logging::info(format!("Saving {total} records in chunks of {chunk_size}"));

    for start in (0..total).step_by(chunk_size) {
        let end = (start + chunk_size).min(total);
        let chunk: Vec<Item> = (start..end)
            .map(|i| Item {
                id: i + 1,
                title: format!("Item {}", i + 1),
                url: format!("https://example.com/item/{}", i + 1),
                category: "chunked",
            })
            .collect();

        let index = start / chunk_size;
        match crawlab_sdk::save_batch(&chunk) {
            Ok(()) => logging::info(format!("Chunk {index} done ({}-{end}/{total})", start + 1)),
            Err(e) => logging::error(format!("Chunk {index} failed: {e}")),
        }
    }

    logging::info("All records saved");
}
