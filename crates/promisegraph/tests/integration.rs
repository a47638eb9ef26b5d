//! End-to-end scenarios for the streamed-promise core, ported from the
//! reference implementation's testable-properties list.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::Poll;

use futures_util::StreamExt;
use promisegraph::{scoped, AppendFeeder, BoxFuture, PieceStream, SharedError, StreamedPromise};

#[derive(Debug, thiserror::Error, Clone)]
#[error("{0}")]
struct TestError(String);

/// Wraps a finite iterator of pieces in a stream that counts every poll
/// (including the final one that yields `None`), so tests can assert the
/// producer was advanced exactly `N + 1` times.
fn counting_producer(
    pieces: Vec<Result<String, SharedError>>,
    advances: Arc<AtomicUsize>,
) -> PieceStream<String> {
    let mut remaining = pieces.into_iter();
    Box::pin(futures_util::stream::poll_fn(move |_cx| {
        advances.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(remaining.next())
    }))
}

fn concat_packager() -> promisegraph::Packager<String, String> {
    Arc::new(|promise: Arc<StreamedPromise<String, String>>| {
        Box::pin(async move {
            let mut whole = String::new();
            let mut cursor = promise.iterate();
            while let Some(piece) = cursor.next().await {
                whole.push_str(piece?.as_str());
            }
            Ok(whole)
        }) as BoxFuture<Result<String, SharedError>>
    })
}

#[tokio::test]
async fn scenario_1_two_cursors_replay_identically_and_production_runs_once() {
    let advances = Arc::new(AtomicUsize::new(0));
    let pieces: Vec<Result<String, SharedError>> =
        vec![Ok("a".into()), Ok("b".into()), Ok("c".into())];
    let producer_advances = Arc::clone(&advances);
    let producer: promisegraph::Producer<String, String> =
        Arc::new(move |_promise| Ok(counting_producer(pieces.clone(), Arc::clone(&producer_advances))));

    let promise = StreamedPromise::new(producer, concat_packager(), false);

    let first: Vec<_> = promise.iterate().map(|r| r.unwrap().to_string()).collect().await;
    let second: Vec<_> = promise.iterate().map(|r| r.unwrap().to_string()).collect().await;

    assert_eq!(first, vec!["a", "b", "c"]);
    assert_eq!(second, vec!["a", "b", "c"]);
    assert_eq!(advances.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn scenario_2_exception_positioned_then_end_of_stream() {
    let pieces: Vec<Result<String, SharedError>> =
        vec![Ok("x".into()), Err(SharedError::new(TestError("boom".into())))];
    let producer: promisegraph::Producer<String, String> =
        Arc::new(move |_promise| Ok(counting_producer(pieces.clone(), Arc::new(AtomicUsize::new(0)))));

    let promise = StreamedPromise::new(producer, concat_packager(), false);

    let mut cursor = promise.iterate();
    assert_eq!(cursor.next().await.unwrap().unwrap().as_str(), "x");
    let err = cursor.next().await.unwrap().unwrap_err();
    assert!(err.is_producer_error());
    assert!(cursor.next().await.is_none());

    // A second cursor, started after the first fully drained, sees the same
    // sequence replayed from history.
    let mut second = promise.iterate();
    assert_eq!(second.next().await.unwrap().unwrap().as_str(), "x");
    assert!(second.next().await.unwrap().is_err());
    assert!(second.next().await.is_none());
}

#[tokio::test]
async fn scenario_3_producer_failed_to_start() {
    let producer: promisegraph::Producer<String, String> =
        Arc::new(|_promise| Err(SharedError::new(TestError("nope".into()))));

    let promise = StreamedPromise::new(producer, concat_packager(), false);

    let mut cursor = promise.iterate();
    let err = cursor.next().await.unwrap().unwrap_err();
    assert!(matches!(err, promisegraph::PromiseError::ProducerFailedToStart(_)));
    assert!(cursor.next().await.is_none());
}

#[tokio::test]
async fn scenario_4_whole_is_idempotent_and_packager_runs_once() {
    let package_calls = Arc::new(AtomicUsize::new(0));
    let pieces: Vec<Result<String, SharedError>> =
        vec![Ok("he".into()), Ok("l".into()), Ok("lo".into())];
    let producer: promisegraph::Producer<String, String> =
        Arc::new(move |_promise| Ok(counting_producer(pieces.clone(), Arc::new(AtomicUsize::new(0)))));

    let counted = Arc::clone(&package_calls);
    let packager: promisegraph::Packager<String, String> =
        Arc::new(move |promise: Arc<StreamedPromise<String, String>>| {
            let counted = Arc::clone(&counted);
            Box::pin(async move {
                counted.fetch_add(1, Ordering::SeqCst);
                let mut whole = String::new();
                let mut cursor = promise.iterate();
                while let Some(piece) = cursor.next().await {
                    whole.push_str(piece?.as_str());
                }
                Ok(whole)
            }) as BoxFuture<Result<String, SharedError>>
        });

    let promise = StreamedPromise::new(producer, packager, false);

    let first = promise.collect_whole().await.unwrap();
    let second = promise.collect_whole().await.unwrap();

    assert_eq!(first.as_str(), "hello");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(package_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scenario_5_feeder_capture_errors_swallows_scope_error() {
    let promise_slot: Arc<std::sync::Mutex<Option<Arc<StreamedPromise<String, String>>>>> =
        Arc::new(std::sync::Mutex::new(None));
    let slot = Arc::clone(&promise_slot);

    let result = scoped::<String, _, _>(true, move |feeder| {
        let slot = Arc::clone(&slot);
        async move {
            feeder.append("a".to_string()).unwrap();
            let promise = StreamedPromise::new(feeder.as_producer(), concat_packager(), false);
            *slot.lock().unwrap() = Some(promise);
            Err(SharedError::new(TestError("x".into())))
        }
    })
    .await;

    assert!(result.is_ok(), "capture_errors should swallow the body's error");

    let promise = promise_slot.lock().unwrap().take().unwrap();
    let mut cursor = promise.iterate();
    assert_eq!(cursor.next().await.unwrap().unwrap().as_str(), "a");
    let err = cursor.next().await.unwrap().unwrap_err();
    assert!(err.is_producer_error());
    assert!(cursor.next().await.is_none());
}

#[tokio::test]
async fn scenario_6_feeder_replays_to_cursor_created_after_close() {
    let feeder = Arc::new(AppendFeeder::<String>::new(false));
    feeder.open().unwrap();
    feeder.append("1".to_string()).unwrap();
    feeder.append("2".to_string()).unwrap();
    feeder.close();

    let promise = StreamedPromise::new(feeder.as_producer(), concat_packager(), false);

    let collected: Vec<_> = promise.iterate().map(|r| r.unwrap().to_string()).collect().await;
    assert_eq!(collected, vec!["1", "2"]);
}

#[tokio::test]
async fn feeder_protocol_errors() {
    let feeder = AppendFeeder::<String>::new(false);
    assert!(matches!(
        feeder.append("x".into()),
        Err(promisegraph::FeederError::NotOpen)
    ));

    feeder.open().unwrap();
    feeder.close();
    assert!(matches!(
        feeder.open(),
        Err(promisegraph::FeederError::Closed)
    ));
    assert!(matches!(
        feeder.append("x".into()),
        Err(promisegraph::FeederError::Closed)
    ));

    // close() is idempotent.
    feeder.close();
}

#[tokio::test]
async fn feeder_protocol_violation_is_never_swallowed_by_capture_errors() {
    let result = scoped::<String, _, _>(true, |feeder| async move {
        feeder.close();
        // append after close: a protocol violation, must propagate even
        // though capture_errors is set.
        feeder
            .append("late".to_string())
            .map_err(SharedError::new)?;
        Ok(())
    })
    .await;

    let err = result.unwrap_err();
    assert!(err.downcast_ref::<promisegraph::FeederError>().is_some());
}

#[tokio::test]
async fn eager_and_lazy_modes_produce_identical_sequences() {
    for eager in [false, true] {
        let pieces: Vec<Result<String, SharedError>> =
            vec![Ok("1".into()), Ok("2".into()), Ok("3".into())];
        let producer: promisegraph::Producer<String, String> = Arc::new(move |_promise| {
            Ok(counting_producer(pieces.clone(), Arc::new(AtomicUsize::new(0))))
        });

        let promise = StreamedPromise::new(producer, concat_packager(), eager);
        let collected: Vec<_> = promise.iterate().map(|r| r.unwrap().to_string()).collect().await;
        assert_eq!(collected, vec!["1", "2", "3"], "eager={eager}");
    }
}

#[tokio::test]
async fn packager_reentry_is_detected_instead_of_deadlocking() {
    let pieces: Vec<Result<String, SharedError>> = vec![Ok("a".into())];
    let producer: promisegraph::Producer<String, String> = Arc::new(move |_promise| {
        Ok(counting_producer(pieces.clone(), Arc::new(AtomicUsize::new(0))))
    });

    let packager: promisegraph::Packager<String, String> =
        Arc::new(|promise: Arc<StreamedPromise<String, String>>| {
            Box::pin(async move {
                // Calling collect_whole() from inside the packager must not
                // deadlock; it should be rejected.
                match promise.collect_whole().await {
                    Err(promisegraph::PromiseError::PackagerReentry) => Ok("reentry-detected".to_string()),
                    other => Ok(format!("unexpected: {other:?}")),
                }
            }) as BoxFuture<Result<String, SharedError>>
        });

    let promise = StreamedPromise::new(producer, packager, false);
    let whole = promise.collect_whole().await.unwrap();
    assert_eq!(whole.as_str(), "reentry-detected");
}

#[tokio::test]
async fn packager_error_is_memoized_and_reraised() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let pieces: Vec<Result<String, SharedError>> = vec![Ok("a".into())];
    let producer: promisegraph::Producer<String, String> = Arc::new(move |_promise| {
        Ok(counting_producer(pieces.clone(), Arc::new(AtomicUsize::new(0))))
    });
    let packager: promisegraph::Packager<String, String> = Arc::new(move |_promise| {
        counted.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Err(SharedError::new(TestError("packager blew up".into()))) })
            as BoxFuture<Result<String, SharedError>>
    });

    let promise = StreamedPromise::new(producer, packager, false);

    let first = promise.collect_whole().await;
    let second = promise.collect_whole().await;

    assert!(first.is_err());
    assert!(second.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1, "packager must run at most once");
}
