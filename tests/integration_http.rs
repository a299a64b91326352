//! End-to-end tests: a local origin server hosts archive fixtures and the
//! zipinfo router is driven over real HTTP.
//!
//! Run with: cargo test --test integration_http

use axum::Router;
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::get;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use zipinfo::config::{Config, FetchConfig};
use zipinfo::error::FetchError;
use zipinfo::fetch::{Fetcher, HttpFetcher};
use zipinfo::fingerprint::fingerprint;
use zipinfo::ingest::Ingestor;
use zipinfo::server::{CONTENT_ERROR, ContentResponse, ListResponse, router};

/// Build a ZIP holding `a/` and `a/b.txt` = "hello"
fn zip_fixture() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    writer.add_directory("a/", options).unwrap();
    writer.start_file("a/b.txt", options).unwrap();
    writer.write_all(b"hello").unwrap();
    writer.finish().unwrap().into_inner()
}

/// Build a tar.gz with the same entries as [`zip_fixture`]
fn tar_gz_fixture() -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut dir_header = tar::Header::new_gnu();
    dir_header.set_entry_type(tar::EntryType::Directory);
    dir_header.set_size(0);
    dir_header.set_mode(0o755);
    dir_header.set_cksum();
    builder.append_data(&mut dir_header, "a/", std::io::empty()).unwrap();

    let mut header = tar::Header::new_gnu();
    header.set_size(5);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, "a/b.txt", &b"hello"[..]).unwrap();

    builder.into_inner().unwrap().finish().unwrap()
}

async fn serve_file(
    State(files): State<Arc<HashMap<String, Vec<u8>>>>,
    UrlPath(name): UrlPath<String>,
) -> Result<Vec<u8>, StatusCode> {
    files.get(&name).cloned().ok_or(StatusCode::NOT_FOUND)
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Origin server hosting the archive fixtures, returned alongside its files
async fn spawn_origin() -> (SocketAddr, Arc<HashMap<String, Vec<u8>>>) {
    let zip = zip_fixture();
    let truncated = zip[..zip.len() / 2].to_vec();

    let mut files = HashMap::new();
    files.insert("archive.zip".to_string(), zip);
    files.insert("archive.tar.gz".to_string(), tar_gz_fixture());
    files.insert("broken.zip".to_string(), truncated);
    let files = Arc::new(files);

    let app = Router::new()
        .route("/{name}", get(serve_file))
        .with_state(Arc::clone(&files));
    (spawn(app).await, files)
}

struct Harness {
    origin: SocketAddr,
    app: SocketAddr,
    config: Config,
    _base: tempfile::TempDir,
}

impl Harness {
    async fn start() -> Self {
        let base = tempfile::tempdir().unwrap();
        let config = Config::with_base_dir(base.path());
        let fetcher = HttpFetcher::new(&config.fetch).unwrap();
        let ingestor = Arc::new(Ingestor::new(&config, Arc::new(fetcher)));

        let (origin, _) = spawn_origin().await;
        let app = spawn(router(ingestor, &[]).unwrap()).await;

        Harness {
            origin,
            app,
            config,
            _base: base,
        }
    }

    fn archive_url(&self, name: &str) -> String {
        format!("http://{}/{}", self.origin, name)
    }

    async fn get(&self, route: &str, params: &[(&str, &str)]) -> (StatusCode, String) {
        let url = reqwest::Url::parse_with_params(&format!("http://{}{}", self.app, route), params)
            .unwrap();
        let resp = reqwest::get(url).await.unwrap();
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        (status, resp.text().await.unwrap())
    }

    async fn list(&self, archive_url: &str) -> (StatusCode, ListResponse) {
        let (status, body) = self.get("/zipinfo", &[("url", archive_url)]).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    async fn content(&self, archive_url: &str, path: &str) -> (StatusCode, ContentResponse) {
        let (status, body) = self
            .get("/zipcontent", &[("url", archive_url), ("path", path)])
            .await;
        (status, serde_json::from_str(&body).unwrap())
    }
}

#[tokio::test]
async fn test_hello() {
    let harness = Harness::start().await;
    let (status, body) = harness.get("/", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Hello, World!");
}

#[tokio::test]
async fn test_zip_listing_and_content() {
    let harness = Harness::start().await;
    let url = harness.archive_url("archive.zip");

    let (status, listing) = harness.list(&url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing.status, 200);
    assert_eq!(listing.paths, vec!["a/", "a/b.txt"]);

    let (status, content) = harness.content(&url, "a/b.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        content,
        ContentResponse {
            status: 200,
            content: "hello".to_string()
        }
    );

    // Quoted paths from clients are accepted
    let (status, content) = harness.content(&url, "\"a/b.txt\"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content.content, "hello");
}

#[tokio::test]
async fn test_tar_gz_listing_and_content() {
    let harness = Harness::start().await;
    let url = harness.archive_url("archive.tar.gz");

    let (status, listing) = harness.list(&url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing.paths, vec!["a/", "a/b.txt"]);

    let (_, content) = harness.content(&url, "a/b.txt").await;
    assert_eq!(content.content, "hello");
}

#[tokio::test]
async fn test_truncated_zip_fails_without_cache_dir() {
    let harness = Harness::start().await;
    let url = harness.archive_url("broken.zip");

    let (status, listing) = harness.list(&url).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        listing,
        ListResponse {
            status: 500,
            paths: vec![]
        }
    );

    let fp = fingerprint(&url);
    assert!(!harness.config.expand_dir().join(fp.as_str()).exists());
    assert!(!harness.config.staging_dir().join(fp.as_str()).exists());
}

#[tokio::test]
async fn test_content_before_listing_is_error() {
    let harness = Harness::start().await;
    let url = harness.archive_url("archive.zip");

    let (status, content) = harness.content(&url, "a/b.txt").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(content.status, 500);
    assert_eq!(content.content, CONTENT_ERROR);
}

#[tokio::test]
async fn test_content_errors() {
    let harness = Harness::start().await;
    let url = harness.archive_url("archive.zip");
    harness.list(&url).await;

    for path in ["missing.txt", "a/", "../../etc/passwd"] {
        let (status, content) = harness.content(&url, path).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{path}");
        assert_eq!(content.content, CONTENT_ERROR, "{path}");
    }

    let (status, _) = harness.get("/zipcontent", &[("url", url.as_str())]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_origin_file_is_error() {
    let harness = Harness::start().await;
    let (status, listing) = harness.list(&harness.archive_url("nope.zip")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(listing.paths.is_empty());

    let (status, _) = harness.get("/zipinfo", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_query_string_is_a_separate_cache_entry() {
    let harness = Harness::start().await;
    let plain = harness.archive_url("archive.zip");
    let with_query = format!("{plain}?v=2");

    let (_, listing) = harness.list(&with_query).await;
    assert_eq!(listing.paths, vec!["a/", "a/b.txt"]);

    let (status, _) = harness.content(&plain, "a/b.txt").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let (status, _) = harness.content(&with_query, "a/b.txt").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_relisting_and_concurrent_listing_agree() {
    let harness = Harness::start().await;
    let url = harness.archive_url("archive.tar.gz");

    let (first, second) = tokio::join!(harness.list(&url), harness.list(&url));
    let (_, third) = harness.list(&url).await;

    assert_eq!(third.paths, vec!["a/", "a/b.txt"]);
    assert_eq!(first.1.paths, third.paths);
    assert_eq!(second.1.paths, third.paths);
}

#[tokio::test]
async fn test_http_fetcher_writes_body() {
    let (origin, files) = spawn_origin().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("staged");
    std::fs::write(&dest, b"stale content that must be truncated away entirely").unwrap();

    let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
    fetcher
        .fetch(&format!("http://{origin}/archive.zip"), &dest)
        .await
        .unwrap();

    assert_eq!(&std::fs::read(&dest).unwrap(), &files["archive.zip"]);
}

#[tokio::test]
async fn test_http_fetcher_errors() {
    let (origin, _) = spawn_origin().await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();

    let result = fetcher
        .fetch(&format!("http://{origin}/nope.zip"), &dir.path().join("a"))
        .await;
    assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));

    // Bind then drop a listener to get a port nobody is serving
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let result = fetcher
        .fetch(&format!("http://{closed}/archive.zip"), &dir.path().join("b"))
        .await;
    assert!(matches!(result, Err(FetchError::Unreachable { .. })));

    let result = fetcher
        .fetch(
            &format!("http://{origin}/archive.zip"),
            Path::new("/nonexistent-dir/staged"),
        )
        .await;
    assert!(matches!(result, Err(FetchError::WriteFailed { .. })));
}
