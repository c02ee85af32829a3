//! The relay fetcher against a throwaway local http server.

use std::net::SocketAddr;

use permwatch::{
    MonitorConfig, MonitorError, PageSource, RelayFetcher,
    config::MonitorEnv,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::mpsc,
};

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Answers one connection per response, in order, and reports each request
/// line it saw.
async fn serve(responses: Vec<String>) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut read = 0;
            loop {
                let n = socket.read(&mut buf[read..]).await.unwrap();
                read += n;
                if n == 0 || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let request = String::from_utf8_lossy(&buf[..read]);
            let _ = tx.send(request.lines().next().unwrap_or_default().to_string());
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
    });
    (addr, rx)
}

fn config(vars: &[(&str, String)]) -> MonitorConfig {
    let env: MonitorEnv = envy::from_iter(
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .chain([("REQUEST_TIMEOUT_SECS".to_string(), "5".to_string())]),
    )
    .unwrap();
    MonitorConfig::from_env(env).unwrap()
}

#[tokio::test]
async fn direct_fetch_returns_raw_html() {
    let page = "<p>Total Completed Today: 509 (0.04%)</p>";
    let (addr, _requests) = serve(vec![http_response("200 OK", "text/html", page)]).await;
    let config = config(&[
        ("TARGET_URL", format!("http://{addr}/")),
        ("RELAY_URL", String::new()),
    ]);

    let fetcher = RelayFetcher::new(&config).unwrap();
    assert_eq!(fetcher.fetch_page().await.unwrap(), page);
}

#[tokio::test]
async fn relay_envelope_is_unwrapped() {
    let envelope = r#"{"contents":"<p>Total Completed Today: 12</p>","status":{"http_code":200}}"#;
    let (addr, mut requests) =
        serve(vec![http_response("200 OK", "application/json", envelope)]).await;
    let config = config(&[("RELAY_URL", format!("http://{addr}/get"))]);

    let fetcher = RelayFetcher::new(&config).unwrap();
    assert_eq!(
        fetcher.fetch_page().await.unwrap(),
        "<p>Total Completed Today: 12</p>"
    );
    assert_eq!(
        requests.recv().await.unwrap(),
        "GET /get?url=https%3A%2F%2Fpermtimeline.com%2F HTTP/1.1"
    );
}

#[tokio::test]
async fn upstream_error_wrapped_by_the_relay_is_a_network_error() {
    let envelope =
        r#"{"contents":"<h1>502 Bad Gateway</h1>","status":{"url":"https://permtimeline.com/","http_code":502}}"#;
    let (addr, _requests) =
        serve(vec![http_response("200 OK", "application/json", envelope)]).await;
    let config = config(&[("RELAY_URL", format!("http://{addr}/get"))]);

    let fetcher = RelayFetcher::new(&config).unwrap();
    match fetcher.fetch_page().await {
        Err(err @ MonitorError::Network { status: Some(502), .. }) => {
            assert_eq!(err.user_message(), "HTTP error! status: 502");
        }
        other => panic!("expected network error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_success_status_is_a_network_error() {
    let (addr, _requests) = serve(vec![http_response(
        "503 Service Unavailable",
        "text/plain",
        "busy",
    )])
    .await;
    let config = config(&[("RELAY_URL", format!("http://{addr}/get"))]);

    let fetcher = RelayFetcher::new(&config).unwrap();
    match fetcher.fetch_page().await {
        Err(MonitorError::Network { status, .. }) => assert_eq!(status, Some(503)),
        other => panic!("expected network error, got {other:?}"),
    }
}

#[tokio::test]
async fn one_extra_attempt_when_configured() {
    let (addr, mut requests) = serve(vec![
        http_response("502 Bad Gateway", "text/plain", "nope"),
        http_response("200 OK", "text/html", "<p>ok</p>"),
    ])
    .await;
    let config = config(&[
        ("TARGET_URL", format!("http://{addr}/")),
        ("RELAY_URL", String::new()),
        ("RETRY_COUNT", "1".to_string()),
        ("RETRY_DELAY_SECS", "0".to_string()),
    ]);

    let fetcher = RelayFetcher::new(&config).unwrap();
    assert_eq!(fetcher.fetch_page().await.unwrap(), "<p>ok</p>");
    assert!(requests.recv().await.is_some());
    assert!(requests.recv().await.is_some());
}

#[tokio::test]
async fn no_retry_by_default() {
    let (addr, _requests) = serve(vec![
        http_response("502 Bad Gateway", "text/plain", "nope"),
        http_response("200 OK", "text/html", "<p>ok</p>"),
    ])
    .await;
    let config = config(&[
        ("TARGET_URL", format!("http://{addr}/")),
        ("RELAY_URL", String::new()),
    ]);

    let fetcher = RelayFetcher::new(&config).unwrap();
    assert!(matches!(
        fetcher.fetch_page().await,
        Err(MonitorError::Network { .. })
    ));
}
