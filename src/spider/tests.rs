// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::ipc::MemorySink;
use crate::logging::{Level, MemoryLogger};
use serde_json::json;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

struct Harness {
    spider: BaseSpider,
    sink: MemorySink,
    logger: Arc<MemoryLogger>,
}

fn harness() -> Harness {
    let sink = MemorySink::new();
    let logger = Arc::new(MemoryLogger::new());
    let transport = Arc::new(IpcTransport::new(sink.clone(), logger.clone()));
    let config = Config {
        task_id: "task-1".into(),
        spider_id: "spider-1".into(),
        param: r#"{"keyword":"rust"}"#.into(),
        ..Config::default()
    };
    let spider = BaseSpider::builder("unit")
        .config(config)
        .transport(transport)
        .logger(logger.clone())
        .build();
    Harness {
        spider,
        sink,
        logger,
    }
}

struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::ErrorKind::BrokenPipe.into())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct Noop;

#[async_trait]
impl Spider for Noop {
    async fn run(&self, _spider: &BaseSpider, _cancel: CancellationToken) -> Result<()> {
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl Spider for Failing {
    async fn run(&self, _spider: &BaseSpider, _cancel: CancellationToken) -> Result<()> {
        Err(Error::Other("site layout changed".into()))
    }
}

struct Panicking;

#[async_trait]
impl Spider for Panicking {
    async fn run(&self, spider: &BaseSpider, _cancel: CancellationToken) -> Result<()> {
        spider.save(&json!({"before": "panic"}))?;
        panic!("selector returned nothing");
    }
}

#[test]
fn new_spider_starts_created_with_zeroed_stats() {
    let h = harness();
    assert_eq!(h.spider.state(), LifecycleState::Created);
    assert_eq!(h.spider.name(), "unit");
    assert_eq!(h.spider.context().task_id(), "task-1");
    assert_eq!(h.spider.stats().items_saved(), 0);
    assert_eq!(h.spider.stats().errors(), 0);
}

#[tokio::test]
async fn successful_run_finishes_and_prints_stats() {
    let h = harness();
    h.spider.execute(&Noop).await.unwrap();

    assert_eq!(h.spider.state(), LifecycleState::Finished);
    assert_eq!(h.logger.count_containing(Level::Info, "[unit] Spider finished"), 1);
    assert_eq!(h.logger.count_containing(Level::Info, "[unit] Items saved: 0"), 1);
    assert_eq!(h.spider.stats().errors(), 0);
}

#[tokio::test]
async fn task_error_is_returned_and_counted() {
    let h = harness();
    let err = h.spider.execute(&Failing).await.unwrap_err();

    assert!(matches!(err, Error::Other(ref m) if m == "site layout changed"));
    assert_eq!(h.spider.state(), LifecycleState::Finished);
    assert_eq!(h.spider.stats().errors(), 1);
    assert_eq!(h.logger.count_containing(Level::Error, "Spider failed"), 1);
}

#[tokio::test]
async fn panic_is_contained() {
    let h = harness();
    let err = h.spider.execute(&Panicking).await.unwrap_err();

    match err {
        Error::TaskPanicked(message) => assert_eq!(message, "selector returned nothing"),
        other => panic!("expected a contained panic, got {other:?}"),
    }
    assert_eq!(h.spider.state(), LifecycleState::Finished);
    assert_eq!(h.spider.stats().items_saved(), 1);
    assert_eq!(h.logger.count_containing(Level::Info, "Items saved: 1"), 1);
    assert_eq!(h.sink.frames().unwrap().len(), 1);
}

#[tokio::test]
async fn second_execute_is_rejected() {
    let h = harness();
    h.spider.execute(&Noop).await.unwrap();

    let calls = AtomicUsize::new(0);
    struct Counting<'a>(&'a AtomicUsize);

    #[async_trait]
    impl Spider for Counting<'_> {
        async fn run(&self, _spider: &BaseSpider, _cancel: CancellationToken) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let err = h.spider.execute(&Counting(&calls)).await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidState {
            operation: "execute",
            ref state
        } if state == "finished"
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scope_is_cancelled_after_execute() {
    struct Capture(Mutex<Option<CancellationToken>>);

    #[async_trait]
    impl Spider for Capture {
        async fn run(&self, spider: &BaseSpider, cancel: CancellationToken) -> Result<()> {
            assert_eq!(spider.state(), LifecycleState::Running);
            assert!(!cancel.is_cancelled());
            *self.0.lock().unwrap() = Some(cancel);
            Ok(())
        }
    }

    let h = harness();
    let task = Capture(Mutex::new(None));
    h.spider.execute(&task).await.unwrap();

    let scope = task.0.lock().unwrap().clone().unwrap();
    assert!(scope.is_cancelled());
}

#[tokio::test]
async fn cancel_reaches_a_running_task() {
    struct WaitForCancel(AtomicBool);

    #[async_trait]
    impl Spider for WaitForCancel {
        async fn run(&self, _spider: &BaseSpider, cancel: CancellationToken) -> Result<()> {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.0.store(true, Ordering::SeqCst);
                    Ok(())
                }
                _ = tokio::time::sleep(Duration::from_secs(10)) => {
                    Err(Error::Other("never cancelled".into()))
                }
            }
        }
    }

    let h = harness();
    let task = WaitForCancel(AtomicBool::new(false));
    let spider = &h.spider;
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        spider.cancel();
    };

    let (result, ()) = tokio::join!(spider.execute(&task), canceller);
    result.unwrap();
    assert!(task.0.load(Ordering::SeqCst));
}

#[tokio::test]
async fn base_token_cancels_the_task_scope() {
    struct SeesCancelled;

    #[async_trait]
    impl Spider for SeesCancelled {
        async fn run(&self, _spider: &BaseSpider, cancel: CancellationToken) -> Result<()> {
            if cancel.is_cancelled() {
                Err(Error::Cancelled(crate::retry::CancelPoint::BeforeAttempt))
            } else {
                Ok(())
            }
        }
    }

    let token = CancellationToken::new();
    let spider = BaseSpider::builder("cancelled")
        .config(Config::default())
        .transport(Arc::new(IpcTransport::new(
            MemorySink::new(),
            Arc::new(MemoryLogger::new()),
        )))
        .logger(Arc::new(MemoryLogger::new()))
        .cancel_token(token.clone())
        .build();
    token.cancel();

    let err = spider.execute(&SeesCancelled).await.unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn save_counts_items_and_writes_frames() {
    let h = harness();
    h.spider.save(&json!({"id": 1})).unwrap();
    h.spider
        .save_batch(&[json!({"id": 2}), json!({"id": 3})])
        .unwrap();

    assert_eq!(h.spider.stats().items_saved(), 3);
    let frames = h.sink.frames().unwrap();
    assert_eq!(frames.len(), 2);
    assert!(!frames[0].is_batch());
    assert_eq!(frames[1].records().len(), 2);
}

#[test]
fn empty_batch_saves_nothing() {
    let h = harness();
    h.spider.save_batch::<serde_json::Value>(&[]).unwrap();
    assert_eq!(h.spider.stats().items_saved(), 0);
    assert_eq!(h.sink.write_count(), 0);
}

#[test]
fn failed_saves_count_errors_not_items() {
    let logger = Arc::new(MemoryLogger::new());
    let spider = BaseSpider::builder("broken")
        .config(Config::default())
        .transport(Arc::new(IpcTransport::new(BrokenPipe, logger.clone())))
        .logger(logger)
        .build();

    assert!(matches!(spider.save(&1).unwrap_err(), Error::Io(_)));
    assert!(spider.save_batch(&[1, 2, 3]).is_err());

    assert_eq!(spider.stats().items_saved(), 0);
    assert_eq!(spider.stats().errors(), 2);
}

#[test]
fn save_chunked_splits_into_batches() {
    let h = harness();
    let records: Vec<u32> = (0..7).collect();
    h.spider.save_chunked(&records, 3).unwrap();

    let frames = h.sink.frames().unwrap();
    let sizes: Vec<usize> = frames.iter().map(|f| f.records().len()).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
    assert_eq!(h.spider.stats().items_saved(), 7);
    assert_eq!(h.logger.count_containing(Level::Debug, "(7/7)"), 1);
}

#[test]
fn save_chunked_treats_zero_as_one() {
    let h = harness();
    h.spider.save_chunked(&["a", "b"], 0).unwrap();
    assert_eq!(h.sink.frames().unwrap().len(), 2);
}

#[test]
fn log_helpers_prefix_the_name() {
    let h = harness();
    h.spider.log_info("hello");
    h.spider.log_warn("careful");
    h.spider.log_debug("details");

    assert_eq!(h.logger.messages(Level::Info), vec!["[unit] hello"]);
    assert_eq!(h.logger.messages(Level::Warn), vec!["[unit] careful"]);
    assert_eq!(h.logger.messages(Level::Debug), vec!["[unit] details"]);
    assert_eq!(h.spider.stats().errors(), 0);
}

#[test]
fn log_error_counts_an_error() {
    let h = harness();
    h.spider.log_error("parse failed");
    h.spider.log_error("parse failed again");

    assert_eq!(h.spider.stats().errors(), 2);
    assert_eq!(h.logger.count_containing(Level::Error, "[unit] parse failed"), 2);
}

#[test]
fn counters_are_exposed() {
    let h = harness();
    h.spider.inc_requests();
    h.spider.inc_requests();
    h.spider.inc_errors();

    let snapshot = h.spider.stats().snapshot();
    assert_eq!(snapshot.requests, 2);
    assert_eq!(snapshot.errors, 1);
    assert!(h.spider.duration() <= snapshot.elapsed + Duration::from_secs(1));
}

#[test]
fn params_decode_through_the_context() {
    #[derive(serde::Deserialize)]
    struct Params {
        keyword: String,
    }

    let h = harness();
    let params: Params = h.spider.parse_param().unwrap();
    assert_eq!(params.keyword, "rust");
}

#[test]
fn http_client_follows_the_config() {
    let h = harness();
    let client = h.spider.http_client().unwrap();
    assert_eq!(client.timeout(), h.spider.config().request_timeout);
    assert_eq!(*client.retry_policy(), h.spider.config().retry_policy());
}

#[test]
fn lifecycle_state_names() {
    assert_eq!(LifecycleState::Created.to_string(), "created");
    assert_eq!(LifecycleState::Running.to_string(), "running");
    assert_eq!(LifecycleState::Finished.to_string(), "finished");
}
