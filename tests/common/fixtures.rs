//! Spiders wired to in-memory sinks and recording loggers

use crawlab_sdk::{BaseSpider, Config, IpcMessage, IpcTransport, Level, MemoryLogger, MemorySink};
use std::sync::Arc;
use std::time::Duration;

/// A spider plus handles on everything it writes
pub struct TestSpider {
    pub spider: BaseSpider,
    pub sink: MemorySink,
    pub logger: Arc<MemoryLogger>,
}

impl TestSpider {
    /// Build a spider named `name` with test-friendly configuration
    pub fn new(name: &str) -> Self {
        Self::with_config(name, test_config())
    }

    /// Build a spider named `name` with the given configuration
    pub fn with_config(name: &str, config: Config) -> Self {
        let sink = MemorySink::new();
        let logger = Arc::new(MemoryLogger::new());
        let transport = Arc::new(IpcTransport::new(sink.clone(), logger.clone()));
        let spider = BaseSpider::builder(name)
            .config(config)
            .transport(transport)
            .logger(logger.clone())
            .build();
        Self {
            spider,
            sink,
            logger,
        }
    }

    /// Frames written so far, decoded
    pub fn frames(&self) -> Vec<IpcMessage> {
        self.sink.frames().expect("sink holds valid frames")
    }

    /// Every record across all frames, in write order
    pub fn records(&self) -> Vec<serde_json::Value> {
        self.frames()
            .iter()
            .flat_map(|frame| frame.records().into_iter().cloned())
            .collect()
    }

    /// True when the stats report was logged
    pub fn printed_stats(&self) -> bool {
        self.logger.count_containing(Level::Info, "========== Stats ==========") == 1
    }
}

/// Configuration with fast retries and a known task identity
pub fn test_config() -> Config {
    Config {
        task_id: "task-42".into(),
        spider_id: "spider-7".into(),
        node_id: "node-1".into(),
        param: r#"{"pages":3,"category":"books"}"#.into(),
        max_retries: 2,
        retry_delay: Duration::from_millis(10),
        request_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}
