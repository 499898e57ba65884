use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use cli::server::{router, AppState};
use filemanager_core::config::DatabaseConfig;
use filemanager_core::{Catalog, FileSystem, OsFs, SyncEngine};
use http_body_util::BodyExt;
use serde_json::Value;
use std::fs;
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    temp: tempfile::TempDir,
    app: Router,
    catalog: Arc<dyn Catalog>,
}

async fn test_app() -> TestApp {
    let temp = tempfile::tempdir().unwrap();
    let db = DatabaseConfig {
        path: temp.path().join("catalog.db").to_string_lossy().into_owned(),
        init_sql: None,
    };
    let catalog: Arc<dyn Catalog> = Arc::new(filemanager_core::open_catalog(&db).await.unwrap());
    let fs: Arc<dyn FileSystem> = Arc::new(OsFs);
    let state = Arc::new(AppState {
        fs: fs.clone(),
        engine: SyncEngine::new(fs, catalog.clone()),
        default_depth: 1,
        show_hidden: false,
    });
    TestApp {
        temp,
        app: router(state),
        catalog,
    }
}

impl TestApp {
    fn dir(&self, name: &str) -> String {
        let p = self.temp.path().join(name);
        fs::create_dir_all(&p).unwrap();
        p.to_string_lossy().into_owned()
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let res = self.app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let body = res.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Vec<u8>) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_sync(&self, query: &str, body: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::post(format!("/api/sync{query}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(req).await
    }
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let t = test_app().await;
    let (status, body) = t.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn list_returns_file_infos() {
    let t = test_app().await;
    let dir = t.dir("tree");
    fs::write(format!("{dir}/a.txt"), "hello").unwrap();
    fs::write(format!("{dir}/.hidden"), "x").unwrap();

    let (status, body) = t.get(&format!("/api/list?dir={dir}")).await;
    assert_eq!(status, StatusCode::OK);
    let files = json(&body);
    let files = files.as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["name"], "a.txt");
    assert_eq!(files[0]["size"], 5);
    assert_eq!(files[0]["isDirectory"], false);
    assert!(files[0]["mimeType"].as_str().unwrap().starts_with("text/plain"));

    let (_, body) = t.get(&format!("/api/list?dir={dir}&hidden=true")).await;
    assert_eq!(json(&body).as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn list_applies_include_globs() {
    let t = test_app().await;
    let dir = t.dir("globs");
    fs::write(format!("{dir}/a.txt"), "a").unwrap();
    fs::write(format!("{dir}/b.jpg"), "b").unwrap();
    fs::write(format!("{dir}/c.md"), "c").unwrap();

    let (status, body) = t.get(&format!("/api/list?dir={dir}&include=*.txt,*.md")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<String> = json(&body)
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["a.txt", "c.md"]);
}

#[tokio::test]
async fn list_rejects_bad_input() {
    let t = test_app().await;
    let dir = t.dir("bad");

    let (status, body) = t.get("/api/list").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].is_string());

    let (status, _) = t.get(&format!("/api/list?dir={dir}&pattern=%5B")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t.get(&format!("/api/list?dir={dir}/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn files_list_returns_children() {
    let t = test_app().await;
    let dir = t.dir("children");
    fs::create_dir_all(format!("{dir}/sub")).unwrap();
    fs::write(format!("{dir}/z.txt"), "zz").unwrap();

    let (status, body) = t.get(&format!("/api/files/list?path={dir}")).await;
    assert_eq!(status, StatusCode::OK);
    let entries = json(&body);
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["name"], "sub");
    assert_eq!(entries[0]["isDir"], true);
    assert_eq!(entries[1]["name"], "z.txt");
    assert_eq!(entries[1]["size"], 2);
}

#[tokio::test]
async fn sync_requires_force_for_unknown_pair() {
    let t = test_app().await;
    let src = t.dir("src");
    let dst = t.dir("dst");
    fs::write(format!("{src}/a.txt"), "payload").unwrap();
    let body = format!(r#"{{"source":"{src}","destination":"{dst}"}}"#);

    let (status, _) = t.post_sync("", &body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(!std::path::Path::new(&format!("{dst}/a.txt")).exists());

    let (status, body_bytes) = t.post_sync("?force=true", &body).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body_bytes.is_empty());
    assert_eq!(fs::read_to_string(format!("{dst}/a.txt")).unwrap(), "payload");

    let pairs = t.catalog.list_pairs().await.unwrap();
    assert_eq!(pairs.len(), 1);

    // Pair exists now, so no force is needed.
    let (status, _) = t.post_sync("", &body).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(t.catalog.jobs_for_pair(pairs[0].id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn sync_force_in_body() {
    let t = test_app().await;
    let src = t.dir("s");
    let dst = t.dir("d");
    fs::write(format!("{src}/one.bin"), [0u8, 1, 2]).unwrap();
    let body = format!(r#"{{"source":"{src}","destination":"{dst}","force":true}}"#);

    let (status, _) = t.post_sync("", &body).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(fs::read(format!("{dst}/one.bin")).unwrap(), vec![0u8, 1, 2]);
}

#[tokio::test]
async fn sync_rejects_malformed_requests() {
    let t = test_app().await;
    let dir = t.dir("same");

    let (status, _) = t.post_sync("", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t.post_sync("", r#"{"source":"/tmp"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = format!(r#"{{"source":"{dir}","destination":"{dir}/","force":true}}"#);
    let (status, body) = t.post_sync("", &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].is_string());
    assert!(t.catalog.list_pairs().await.unwrap().is_empty());
}

#[tokio::test]
async fn preflight_returns_ok() {
    let t = test_app().await;
    for uri in ["/api/list", "/api/files/list", "/api/sync"] {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let (status, body) = t.send(req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }
}
