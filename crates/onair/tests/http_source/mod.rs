use std::time::Duration;

use onair::{
    classify,
    config::HttpOptions,
    source::{HttpStreamSource, InfiniteLengthAdapter},
    BufferPlan, ErrorClass, HttpClient, LengthHint, LoadError, OpenError, StreamRequest,
    StreamSource,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{impatient_plan, init_test_tracing, refused_addr, silent_addr, MP3_FRAME};

fn http_source() -> HttpStreamSource {
    HttpStreamSource::new(HttpClient::with_defaults().unwrap(), &BufferPlan::LIVE)
}

fn audio_body(len: usize) -> Vec<u8> {
    let mut body = MP3_FRAME.to_vec();
    body.resize(len, 0x55);
    body
}

async fn read_to_end<S: StreamSource>(source: &mut S) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 333];
    loop {
        let len = source.read(&mut buf).await?;
        if len == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..len]);
    }
}

#[tokio::test]
async fn test_request_headers() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(audio_body(64)))
        .expect(1)
        .mount(&server)
        .await;

    let request = StreamRequest::parse(&format!("{}/live", server.uri()))?
        .with_header("Icy-MetaData", "1")?
        .with_header("Accept-Encoding", "gzip")?
        .with_header("Referer", "http://station.test/")?;
    let mut source = http_source();
    source.open(&request).await?;

    let requests = server.received_requests().await.unwrap();
    let headers = &requests[0].headers;
    assert_eq!(headers.get("accept-encoding").unwrap(), "identity");
    assert!(headers
        .get("user-agent")
        .unwrap()
        .to_str()?
        .starts_with("onair/"));
    assert!(headers.get("icy-metadata").is_none());
    assert_eq!(headers.get("referer").unwrap(), "http://station.test/");
    Ok(())
}

#[tokio::test]
async fn test_known_length_body() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jingle.mp3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(audio_body(1000))
                .insert_header("icy-br", "128"),
        )
        .mount(&server)
        .await;

    let mut source = http_source();
    let request = StreamRequest::parse(&format!("{}/jingle.mp3", server.uri()))?;
    assert_eq!(source.open(&request).await?, LengthHint::Known(1000));
    assert_eq!(
        source.response_headers().unwrap().first("icy-br"),
        Some("128")
    );

    let body = read_to_end(&mut source).await?;
    assert_eq!(body, audio_body(1000));
    assert_eq!(source.stats().bytes_transferred, 1000);
    // end of stream is sticky
    assert_eq!(source.read(&mut [0u8; 16]).await?, 0);

    source.close();
    source.close();
    assert!(!source.is_open());
    Ok(())
}

#[tokio::test]
async fn test_live_feed_reports_unknown_length() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stream.aac"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(audio_body(128)))
        .mount(&server)
        .await;

    let mut source = InfiniteLengthAdapter::new(http_source());
    let request = StreamRequest::parse(&format!("{}/stream.aac", server.uri()))?;
    assert_eq!(source.open(&request).await?, LengthHint::Unknown);
    assert_eq!(read_to_end(&mut source).await?.len(), 128);
    Ok(())
}

#[tokio::test]
async fn test_error_status_fails_open() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut source = http_source();
    for (name, code) in [("missing", 404), ("busy", 503)] {
        let request = StreamRequest::parse(&format!("{}/{name}", server.uri()))?;
        match source.open(&request).await {
            Err(OpenError::HttpStatus(status)) => assert_eq!(status, code),
            other => panic!("expected status {code}, got {other:?}"),
        }
        assert!(!source.is_open());
    }

    // a status failure of the stream open is retried
    let error = LoadError::from(OpenError::HttpStatus(503));
    assert_eq!(classify(&error), ErrorClass::Transient);
    Ok(())
}

#[tokio::test]
async fn test_empty_body_fails_open() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut source = http_source();
    let request = StreamRequest::parse(&format!("{}/empty", server.uri()))?;
    assert!(matches!(
        source.open(&request).await,
        Err(OpenError::EmptyBody)
    ));
    Ok(())
}

#[tokio::test]
async fn test_redirects_are_followed() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", format!("{}/new", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(audio_body(32)))
        .mount(&server)
        .await;

    let mut source = http_source();
    let request = StreamRequest::parse(&format!("{}/old", server.uri()))?;
    assert_eq!(source.open(&request).await?, LengthHint::Known(32));
    assert_eq!(source.uri().unwrap().path(), "/new");
    Ok(())
}

#[tokio::test]
async fn test_refused_connection_is_fatal() -> anyhow::Result<()> {
    init_test_tracing();
    let mut source = http_source();
    let request = StreamRequest::parse(&format!("http://{}/live", refused_addr()))?;

    let error = match source.open(&request).await {
        Err(e) => LoadError::from(e),
        Ok(hint) => panic!("expected refused connection, opened with {hint:?}"),
    };
    assert_eq!(classify(&error), ErrorClass::Fatal);
    Ok(())
}

#[tokio::test]
async fn test_close_before_open_is_noop() {
    let mut source = http_source();
    source.close();
    assert!(source.uri().is_none());
    assert!(source.response_headers().is_none());
    assert_eq!(source.stats().bytes_transferred, 0);
}

#[tokio::test]
async fn test_silent_server_times_out_open() -> anyhow::Result<()> {
    init_test_tracing();
    let plan = impatient_plan();
    let mut source = HttpStreamSource::new(HttpClient::new(&HttpOptions::default(), &plan)?, &plan);
    let request = StreamRequest::parse(&format!("http://{}/live", silent_addr().await))?;

    let result = tokio::time::timeout(Duration::from_secs(5), source.open(&request))
        .await
        .expect("open must give up on its own");
    let error = match result {
        Err(OpenError::Timeout(timeout)) => {
            assert_eq!(timeout, Duration::from_millis(300));
            LoadError::from(OpenError::Timeout(timeout))
        }
        other => panic!("expected open timeout, got {other:?}"),
    };
    assert_eq!(classify(&error), ErrorClass::Transient);
    assert!(!source.is_open());
    Ok(())
}

#[tokio::test]
async fn test_reopen_resets_transfer_stats() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jingle.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(audio_body(500)))
        .mount(&server)
        .await;

    let mut source = http_source();
    let request = StreamRequest::parse(&format!("{}/jingle.mp3", server.uri()))?;
    source.open(&request).await?;
    assert_eq!(read_to_end(&mut source).await?.len(), 500);
    assert_eq!(source.stats().bytes_transferred, 500);

    source.open(&request).await?;
    assert_eq!(source.stats().bytes_transferred, 0);
    let mut buf = [0u8; 100];
    assert_eq!(source.read(&mut buf).await?, 100);
    assert_eq!(source.stats().bytes_transferred, 100);
    Ok(())
}
