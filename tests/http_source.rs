//! HTTP page source tests - canned responses from a local listener

use serde_json::json;
use sigcrawl::config::{resolve, ConfigFile, SettingsArgs};
use sigcrawl::fetcher::{fetch_kind, HttpPageSource, PageSource};
use sigcrawl::SignatureKind;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    (listener, base)
}

/// Answer one connection per canned response, in order
fn serve(listener: TcpListener, responses: Vec<String>) {
    tokio::spawn(async move {
        for response in responses {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            sock.write_all(response.as_bytes()).await.unwrap();
            let _ = sock.shutdown().await;
        }
    });
}

fn response(status: &str, body: &str) -> String {
    format!(
        concat!(
            "HTTP/1.1 {}\r\n",
            "Content-Type: application/json\r\n",
            "Content-Length: {}\r\n",
            "Connection: close\r\n\r\n{}"
        ),
        status,
        body.len(),
        body
    )
}

#[tokio::test]
async fn not_found_is_fatal_with_body_text() {
    let (listener, base) = bind().await;
    serve(listener, vec![response("404 Not Found", "no such listing")]);

    let source = HttpPageSource::new(5000, 0);
    let err = source.fetch_page(&format!("{base}/api/v1/signatures/")).await.unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("404"));
    assert!(msg.contains("no such listing"));
}

#[tokio::test]
async fn invalid_json_is_fatal() {
    let (listener, base) = bind().await;
    serve(listener, vec![response("200 OK", "<html>maintenance</html>")]);

    let source = HttpPageSource::new(5000, 0);
    let err = source.fetch_page(&format!("{base}/api/v1/signatures/")).await.unwrap_err();
    assert!(err.to_string().contains("Failed to parse signature page"));
}

#[tokio::test]
async fn body_without_results_is_fatal() {
    let (listener, base) = bind().await;
    serve(
        listener,
        vec![response("200 OK", r#"{"detail":"Request was throttled."}"#)],
    );

    let source = HttpPageSource::new(5000, 0);
    assert!(source.fetch_page(&format!("{base}/api/v1/signatures/")).await.is_err());
}

#[tokio::test]
async fn unavailable_then_ok_succeeds_with_one_retry() {
    let (listener, base) = bind().await;
    let page = json!({
        "results": [{"id": 1, "text_signature": "a()", "hex_signature": "0x1"}],
        "next": null
    })
    .to_string();
    serve(
        listener,
        vec![response("503 Service Unavailable", "busy"), response("200 OK", &page)],
    );

    let source = HttpPageSource::new(5000, 1);
    let page = source.fetch_page(&format!("{base}/api/v1/signatures/")).await.unwrap();
    assert_eq!(page.results.len(), 1);
    assert!(page.next.is_none());
}

#[tokio::test]
async fn unavailable_without_retries_is_fatal() {
    let (listener, base) = bind().await;
    serve(listener, vec![response("503 Service Unavailable", "busy")]);

    let source = HttpPageSource::new(5000, 0);
    let err = source.fetch_page(&format!("{base}/api/v1/signatures/")).await.unwrap_err();
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn fetch_kind_follows_cursor_over_http() {
    let (listener, base) = bind().await;
    let first = json!({
        "results": [{
            "id": 1,
            "text_signature": "Transfer(address,address,uint256)",
            "hex_signature": "0xddf2"
        }],
        "next": format!("{base}/api/v1/event-signatures/?page=2")
    })
    .to_string();
    let second = json!({
        "results": [{
            "id": 2,
            "text_signature": "Approval(address,address,uint256)",
            "hex_signature": "0x8c5b"
        }],
        "next": null
    })
    .to_string();
    serve(listener, vec![response("200 OK", &first), response("200 OK", &second)]);

    let dir = tempdir().unwrap();
    let args = SettingsArgs {
        api_base_url: Some(base),
        data_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    let cfg = resolve(args, ConfigFile::default()).unwrap();

    let summary = fetch_kind(&cfg, SignatureKind::Event).await.unwrap();

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.records, 2);
    let written: Vec<serde_json::Value> =
        serde_json::from_slice(&std::fs::read(&summary.path).unwrap()).unwrap();
    assert_eq!(written[0]["id"], 1);
    assert_eq!(written[1]["id"], 2);
}
