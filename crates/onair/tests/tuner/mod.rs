use std::time::Duration;

use onair::{
    cache::{CacheStore, OnairCache},
    config::{CacheOptions, OnairConfig, RetryOptions},
    ErrorKind, LengthHint, SessionEvent, StreamRequest, Tuner,
};
use tokio::sync::mpsc;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{impatient_plan, init_test_tracing, refused_addr, silent_addr, MP3_FRAME};

fn fast_retry_config() -> OnairConfig {
    OnairConfig {
        retry: RetryOptions {
            base_delay_ms: 20,
            max_delay_ms: 100,
            jitter: 0.0,
        },
        ..Default::default()
    }
}

async fn next_event(rx: &mut mpsc::Receiver<SessionEvent>) -> Option<SessionEvent> {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("session went quiet")
}

/// Collects every remaining event of a session that is ending.
async fn drain(rx: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(event) = next_event(rx).await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_tune_through_playlist() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/station.pls"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("[playlist]\nFile1={}/stream.aac\n", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stream.aac"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3_FRAME))
        .mount(&server)
        .await;

    let mut tuner = Tuner::new(fast_retry_config()).await?;
    let mut rx = tuner
        .tune(StreamRequest::parse(&format!("{}/station.pls", server.uri()))?)
        .await;

    match next_event(&mut rx).await {
        Some(SessionEvent::Connected { url, length, .. }) => {
            assert_eq!(url.path(), "/stream.aac");
            assert_eq!(length, LengthHint::Unknown);
        }
        other => panic!("expected connection, got {other:?}"),
    }
    assert_eq!(
        next_event(&mut rx).await,
        Some(SessionEvent::Data(bytes::Bytes::from_static(MP3_FRAME)))
    );
    assert!(tuner.is_playing());

    tuner.stop().await;
    assert!(!tuner.is_playing());
    assert_eq!(drain(&mut rx).await.last(), Some(&SessionEvent::Stopped));
    Ok(())
}

#[tokio::test]
async fn test_reconnects_after_service_unavailable() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3_FRAME))
        .with_priority(2)
        .mount(&server)
        .await;

    let mut tuner = Tuner::new(fast_retry_config()).await?;
    let mut rx = tuner
        .tune(StreamRequest::parse(&format!("{}/live", server.uri()))?)
        .await;

    match next_event(&mut rx).await {
        Some(SessionEvent::Reconnecting { attempt, delay, .. }) => {
            assert_eq!(attempt, 1);
            assert!(delay <= Duration::from_millis(100));
        }
        other => panic!("expected reconnect, got {other:?}"),
    }
    assert!(matches!(
        next_event(&mut rx).await,
        Some(SessionEvent::Connected { .. })
    ));
    assert!(matches!(
        next_event(&mut rx).await,
        Some(SessionEvent::Data(_))
    ));

    tuner.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_refused_station_fails_without_retry() -> anyhow::Result<()> {
    init_test_tracing();
    let mut tuner = Tuner::new(fast_retry_config()).await?;
    let mut rx = tuner
        .tune(StreamRequest::parse(&format!("http://{}/live", refused_addr()))?)
        .await;

    match next_event(&mut rx).await {
        Some(SessionEvent::Failed(error)) => {
            assert!(error.causes().any(|e| e.kind() == ErrorKind::Connect));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(next_event(&mut rx).await, None);
    Ok(())
}

#[tokio::test]
async fn test_tuning_again_stops_previous_session() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut tuner = Tuner::new(fast_retry_config()).await?;
    let mut first = tuner
        .tune(StreamRequest::parse(&format!("{}/one", server.uri()))?)
        .await;
    assert!(matches!(
        next_event(&mut first).await,
        Some(SessionEvent::Reconnecting { .. })
    ));

    let mut second = tuner
        .tune(StreamRequest::parse(&format!("{}/two", server.uri()))?)
        .await;
    assert_eq!(drain(&mut first).await.last(), Some(&SessionEvent::Stopped));
    assert!(matches!(
        next_event(&mut second).await,
        Some(SessionEvent::Reconnecting { attempt: 1, .. })
    ));

    tuner.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = OnairConfig {
        retry: RetryOptions {
            jitter: 2.0,
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(Tuner::new(config).await.is_err());
}

#[tokio::test]
async fn test_file_cache_opens_inside_runtime() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cache_dir = dir.path().join("cache");
    std::fs::create_dir_all(&cache_dir)?;
    std::fs::write(cache_dir.join("leftover.cache"), b"http://a.test/x\n\nold")?;

    let config = OnairConfig {
        cache: CacheOptions {
            enabled: true,
            dir: Some(cache_dir),
            ..Default::default()
        },
        ..fast_retry_config()
    };
    let tuner = Tuner::new(config).await?;
    let cache = tuner.cache().expect("cache is enabled");
    assert!(matches!(**cache, OnairCache::File(_)));
    // existing entries are indexed when the tuner is built
    assert_eq!(cache.used_bytes(), 20);
    Ok(())
}

#[tokio::test]
async fn test_silent_station_is_retried() -> anyhow::Result<()> {
    init_test_tracing();
    let config = OnairConfig {
        buffer: impatient_plan(),
        ..fast_retry_config()
    };
    let mut tuner = Tuner::new(config).await?;
    let mut rx = tuner
        .tune(StreamRequest::parse(&format!("http://{}/live", silent_addr().await))?)
        .await;

    for expected in 1..=2 {
        match next_event(&mut rx).await {
            Some(SessionEvent::Reconnecting { attempt, error, .. }) => {
                assert_eq!(attempt, expected);
                assert!(error.causes().any(|e| e.kind() == ErrorKind::Timeout));
            }
            other => panic!("expected reconnect, got {other:?}"),
        }
    }

    tuner.stop().await;
    assert_eq!(drain(&mut rx).await.last(), Some(&SessionEvent::Stopped));
    Ok(())
}
