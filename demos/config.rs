//! Configuration example
//!
//! Loads settings from the `CRAWLAB_*` environment variables and saves in
//! batches of the configured size. Try:
//!
//! ```bash
//! CRAWLAB_BATCH_SIZE=50 CRAWLAB_RETRY_DELAY=500ms cargo run --example config
//! ```

use async_trait::async_trait;
use crawlab_sdk::{BaseSpider, Result, Spider, logging};
use serde_json::json;
use tokio_util::sync::CancellationToken;

struct ConfigSpider;

#[async_trait]
impl Spider for ConfigSpider {
    async fn run(&self, spider: &BaseSpider, _cancel: CancellationToken) -> Result<()> {
        let config = spider.config();
        config.print(logging::default_logger().as_ref());

        spider.log_info(&format!("Max retries: {}", config.max_retries));
        spider.log_info(&format!("Retry delay: {:?}", config.retry_delay));
        spider.log_info(&format!("Request timeout: {:?}", config.request_timeout));
        spider.log_info(&format!("Max concurrency: {}", config.max_concurrency));
        spider.log_info(&format!("Batch size: {}", config.batch_size));

        let items: Vec<_> = (1..=500)
            .map(|i| json!({ "id": i, "value": i * 100 }))
            .collect();
        spider.save_chunked(&items, config.batch_size)?;

        spider.log_info("Config spider finished");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let spider = BaseSpider::new("ConfigSpider");
    if let Err(e) = spider.execute(&ConfigSpider).await {
        logging::error(format!("Execution failed: {e}"));
    }
}
