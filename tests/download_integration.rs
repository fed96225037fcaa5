//! Integration tests for single-file downloads.
//!
//! A wiremock server stands in for both Drive hosts; requests are matched on
//! the query string the engine builds.

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use gdl_core::drive::Endpoints;
use gdl_core::{Config, DownloadError, DownloadRequest, Downloader, GdlError};
use support::socket_guard::{should_skip_socket_bound_test, start_mock_server_or_skip};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const FILE_LINK: &str = "https://drive.google.com/file/d/BIG42/view?usp=sharing";

fn fast_config() -> Config {
    Config {
        retry_delay: 0.01,
        ..Config::default()
    }
}

fn downloader(server: &MockServer, config: Config) -> Downloader {
    Downloader::new(config)
        .expect("downloader should build")
        .with_endpoints(Endpoints::new(server.uri(), server.uri()))
}

/// Fails the first `failures` requests with `status`, then serves `body` with `success_status`.
struct FlakyResponder {
    requests: Arc<AtomicUsize>,
    failures: usize,
    status: u16,
    success_status: u16,
    body: Vec<u8>,
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.requests.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            ResponseTemplate::new(self.status)
        } else {
            ResponseTemplate::new(self.success_status).set_body_bytes(self.body.clone())
        }
    }
}

#[tokio::test]
async fn test_download_writes_exact_body() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let content: Vec<u8> = (0..=255u8).cycle().take(50_000).collect();

    Mock::given(method("GET"))
        .and(path("/uc"))
        .and(query_param("export", "download"))
        .and(query_param("id", "BIG42"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = Config {
        chunk_size: 1024,
        ..fast_config()
    };
    let output = temp_dir.path().join("archive.zip");
    let outcome = downloader(&mock_server, config)
        .download(&DownloadRequest::new(FILE_LINK, &output))
        .await
        .expect("download should succeed");

    assert_eq!(std::fs::read(&output).unwrap(), content);
    assert_eq!(outcome.path, output);
    assert_eq!(outcome.total_bytes, 50_000);
    assert_eq!(outcome.attempts, 1);
}

#[tokio::test]
async fn test_confirmation_page_is_followed_with_token() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let warning_page = r#"<html><body>
        <p>Google Drive can't scan this file for viruses.</p>
        <a id="uc-download-link" href="/uc?export=download&amp;confirm=Ab12_x&amp;id=BIG42">Download anyway</a>
        </body></html>"#;

    Mock::given(method("GET"))
        .and(path("/uc"))
        .and(query_param("confirm", "Ab12_x"))
        .and(query_param("id", "BIG42"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"real file bytes".to_vec()))
        .with_priority(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/uc"))
        .and(query_param("id", "BIG42"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(warning_page, "text/html"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let output = temp_dir.path().join("big.iso");
    let outcome = downloader(&mock_server, fast_config())
        .download(&DownloadRequest::new(FILE_LINK, &output))
        .await
        .expect("download should succeed");

    assert_eq!(std::fs::read(&output).unwrap(), b"real file bytes");
    assert!(!outcome.confirmation_unresolved);
}

#[tokio::test]
async fn test_confirmation_token_from_hidden_form_input() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let warning_page = r#"<html><form id="download-form" action="/uc" method="get">
        <input type="hidden" name="id" value="BIG42">
        <input type="hidden" name="confirm" value="t0ken">
        </form></html>"#;

    Mock::given(method("GET"))
        .and(path("/uc"))
        .and(query_param("confirm", "t0ken"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
        .with_priority(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/uc"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(warning_page, "text/html"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let output = temp_dir.path().join("form.bin");
    downloader(&mock_server, fast_config())
        .download(&DownloadRequest::new(FILE_LINK, &output))
        .await
        .expect("download should succeed");

    assert_eq!(std::fs::read(&output).unwrap(), b"payload");
}

#[tokio::test]
async fn test_missing_token_saves_page_and_flags_outcome() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let warning_page = r#"<html><div class="uc-download-link">Download anyway</div></html>"#;

    Mock::given(method("GET"))
        .and(path("/uc"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(warning_page, "text/html"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let output = temp_dir.path().join("page.bin");
    let outcome = downloader(&mock_server, fast_config())
        .download(&DownloadRequest::new(FILE_LINK, &output))
        .await
        .expect("lenient mode keeps the response");

    assert!(outcome.confirmation_unresolved);
    assert_eq!(std::fs::read_to_string(&output).unwrap(), warning_page);
}

#[tokio::test]
async fn test_missing_token_fails_in_strict_mode() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/uc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><p>download_warning</p></html>", "text/html"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = Config {
        strict_confirmation: true,
        ..fast_config()
    };
    let output = temp_dir.path().join("strict.bin");
    let result = downloader(&mock_server, config)
        .download(&DownloadRequest::new(FILE_LINK, &output))
        .await;

    match result {
        Err(GdlError::DownloadFailed {
            attempts,
            source: DownloadError::ConfirmationTokenMissing { .. },
            ..
        }) => assert_eq!(attempts, 1),
        other => panic!("Expected ConfirmationTokenMissing, got: {other:?}"),
    }
    assert!(!output.exists(), "nothing is written before the token is resolved");
}

#[tokio::test]
async fn test_resume_sends_range_and_appends() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let output = temp_dir.path().join("partial.txt");
    std::fs::write(&output, b"hello ").unwrap();

    Mock::given(method("GET"))
        .and(path("/uc"))
        .and(header("Range", "bytes=6-"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(b"world".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let outcome = downloader(&mock_server, fast_config())
        .download(&DownloadRequest::new(FILE_LINK, &output).with_resume(true))
        .await
        .expect("resume should succeed");

    assert_eq!(std::fs::read(&output).unwrap(), b"hello world");
    assert!(outcome.resumed);
    assert_eq!(outcome.bytes_written, 5);
    assert_eq!(outcome.total_bytes, 11);
}

#[tokio::test]
async fn test_resume_retries_from_current_size() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let output = temp_dir.path().join("partial.bin");
    std::fs::write(&output, b"abc").unwrap();

    Mock::given(method("GET"))
        .and(path("/uc"))
        .and(header("Range", "bytes=3-"))
        .respond_with(FlakyResponder {
            requests: Arc::new(AtomicUsize::new(0)),
            failures: 1,
            status: 503,
            success_status: 206,
            body: b"def".to_vec(),
        })
        .expect(2)
        .mount(&mock_server)
        .await;

    let outcome = downloader(&mock_server, fast_config())
        .download(&DownloadRequest::new(FILE_LINK, &output).with_resume(true))
        .await
        .expect("second attempt should succeed");

    assert_eq!(std::fs::read(&output).unwrap(), b"abcdef");
    assert_eq!(outcome.attempts, 2);
}

/// Reads one request head and returns it lowercased.
async fn read_request_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }
    String::from_utf8_lossy(&head).to_ascii_lowercase()
}

/// Serves a body that stops after 4 of its 10 declared bytes, then answers
/// the next connection with `second_response`. Yields both request heads.
async fn spawn_cut_short_server(second_response: &'static [u8]) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut heads = Vec::new();

        let (mut socket, _) = listener.accept().await.unwrap();
        heads.push(read_request_head(&mut socket).await);
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\nabcd")
            .await
            .unwrap();
        socket.flush().await.unwrap();
        drop(socket);

        let (mut socket, _) = listener.accept().await.unwrap();
        heads.push(read_request_head(&mut socket).await);
        socket.write_all(second_response).await.unwrap();
        socket.flush().await.unwrap();
        let _ = socket.shutdown().await;

        heads
    });

    (base, handle)
}

#[tokio::test]
async fn test_cut_short_body_resumes_from_partial_bytes() {
    if should_skip_socket_bound_test() {
        return;
    }
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let output = temp_dir.path().join("cut.bin");

    let (base, server) = spawn_cut_short_server(
        b"HTTP/1.1 206 Partial Content\r\nContent-Length: 6\r\nContent-Range: bytes 4-9/10\r\nConnection: close\r\n\r\nefghij",
    )
    .await;

    let outcome = Downloader::new(fast_config())
        .unwrap()
        .with_endpoints(Endpoints::new(base.clone(), base))
        .download(&DownloadRequest::new(FILE_LINK, &output).with_resume(true))
        .await
        .expect("second attempt should finish the file");

    let heads = server.await.unwrap();
    assert!(!heads[0].contains("range:"), "first request: {}", heads[0]);
    assert!(heads[1].contains("range: bytes=4-"), "second request: {}", heads[1]);
    assert_eq!(std::fs::read(&output).unwrap(), b"abcdefghij");
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.resumed);
    assert_eq!(outcome.total_bytes, 10);
}

#[tokio::test]
async fn test_cut_short_body_without_resume_starts_over() {
    if should_skip_socket_bound_test() {
        return;
    }
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let output = temp_dir.path().join("cut.bin");

    let (base, server) = spawn_cut_short_server(
        b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\n0123456789",
    )
    .await;

    let outcome = Downloader::new(fast_config())
        .unwrap()
        .with_endpoints(Endpoints::new(base.clone(), base))
        .download(&DownloadRequest::new(FILE_LINK, &output))
        .await
        .expect("second attempt should rewrite the file");

    let heads = server.await.unwrap();
    assert!(heads.iter().all(|head| !head.contains("range:")), "{heads:?}");
    assert_eq!(std::fs::read(&output).unwrap(), b"0123456789");
    assert_eq!(outcome.attempts, 2);
    assert!(!outcome.resumed);
}

#[tokio::test]
async fn test_retries_exhausted_reports_last_error() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/uc"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let result = downloader(&mock_server, fast_config())
        .download(&DownloadRequest::new(FILE_LINK, temp_dir.path().join("x.bin")))
        .await;

    match result {
        Err(GdlError::DownloadFailed {
            attempts,
            source: DownloadError::HttpStatus { status, .. },
            ..
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(status, 503);
        }
        other => panic!("Expected DownloadFailed after 3 attempts, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_transient_failures_then_success() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let requests = Arc::new(AtomicUsize::new(0));

    Mock::given(method("GET"))
        .and(path("/uc"))
        .respond_with(FlakyResponder {
            requests: Arc::clone(&requests),
            failures: 2,
            status: 500,
            success_status: 200,
            body: b"eventually".to_vec(),
        })
        .mount(&mock_server)
        .await;

    let output = temp_dir.path().join("flaky.bin");
    let outcome = downloader(&mock_server, fast_config())
        .download(&DownloadRequest::new(FILE_LINK, &output))
        .await
        .expect("third attempt should succeed");

    assert_eq!(outcome.attempts, 3);
    assert_eq!(requests.load(Ordering::SeqCst), 3);
    assert_eq!(std::fs::read(&output).unwrap(), b"eventually");
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/uc"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = downloader(&mock_server, fast_config())
        .download(&DownloadRequest::new(FILE_LINK, temp_dir.path().join("x.bin")))
        .await;

    assert!(
        matches!(result, Err(GdlError::DownloadFailed { attempts: 1, .. })),
        "{result:?}"
    );
}

#[tokio::test]
async fn test_docs_link_uses_export_host_and_detected_format() {
    let Some(drive_server) = start_mock_server_or_skip().await else {
        return;
    };
    let Some(docs_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/uc"))
        .and(query_param("export", "download"))
        .and(query_param("format", "pdf"))
        .and(query_param("id", "DOC99"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
        .expect(1)
        .mount(&docs_server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&drive_server)
        .await;

    let output = temp_dir.path().join("Minutes.PDF");
    Downloader::new(fast_config())
        .unwrap()
        .with_endpoints(Endpoints::new(drive_server.uri(), docs_server.uri()))
        .download(&DownloadRequest::new(
            "https://docs.google.com/document/d/DOC99/edit#heading=h.1",
            &output,
        ))
        .await
        .expect("export should succeed");

    assert_eq!(std::fs::read(&output).unwrap(), b"%PDF-1.7");
}

#[tokio::test]
async fn test_explicit_format_wins_over_extension() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/uc"))
        .and(query_param("format", "csv"))
        .and(query_param("id", "SHEET1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"a,b\n1,2\n".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let output = temp_dir.path().join("sheet.xlsx");
    downloader(&mock_server, fast_config())
        .download(
            &DownloadRequest::new("https://docs.google.com/spreadsheets/d/SHEET1/edit", &output)
                .with_format(Some("csv".to_string())),
        )
        .await
        .expect("export should succeed");

    assert_eq!(std::fs::read(&output).unwrap(), b"a,b\n1,2\n");
}

#[tokio::test]
async fn test_invalid_url_makes_no_request() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = downloader(&mock_server, fast_config())
        .download(&DownloadRequest::new(
            "https://dropbox.com/s/abc/file.zip",
            temp_dir.path().join("x.zip"),
        ))
        .await;

    assert!(matches!(result, Err(GdlError::InvalidUrl { .. })), "{result:?}");
}
