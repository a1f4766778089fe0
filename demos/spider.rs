//! Spider example
//!
//! A task implementing [`Spider`] gets statistics, prefixed logging, panic
//! containment and a cancellable scope from [`BaseSpider`].

use async_trait::async_trait;
use crawlab_sdk::{BaseSpider, CancelPoint, Error, Result, Spider, logging};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
struct Item {
    id: u32,
    title: String,
    url: String,
    status: &'static str,
}

struct MySpider;

#[async_trait]
impl Spider for MySpider {
    async fn run(&self, spider: &BaseSpider, cancel: CancellationToken) -> Result<()> {
        spider.log_info("Starting crawl");

        for id in 1..=100 {
            if cancel.is_cancelled() {
                spider.log_warn("Task cancelled");
                return Err(Error::Cancelled(CancelPoint::BeforeAttempt));
            }

            let item = Item {
                id,
                title: format!("Item {id}"),
                url: format!("https://example.com/item/{id}"),
                status: "active",
            };
            spider.save(&item)?;
            spider.inc_requests();

            if id % 10 == 0 {
                spider.log_info(&format!("Crawled {id} items"));
            }
        }

        spider.log_info("Crawl complete");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let spider = BaseSpider::new("MySpider");
    match spider.execute(&MySpider).await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => logging::warn(format!("Execution cancelled: {e}")),
        Err(e) => logging::error(format!("Execution failed: {e}")),
    }
}
