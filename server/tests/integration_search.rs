use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use comics_core::persist::StorePaths;
use comics_core::store::{JsonStore, SledStore};
use comics_core::{CandidateId, ComicRecord, ComicStore, RemoteComic};
use fetcher::{ComicSource, FetchFailure, FetchOutcome, Pipeline, PipelineSettings};
use http_body_util::BodyExt;
use serde_json::Value;
use server::{build_app, AppState, ADMIN_TOKEN_HEADER};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const TOKEN: &str = "s3cret";

/// Ids below `bound` exist; 4 fails transiently. Each fetch sleeps for `delay`.
struct Remote {
    bound: CandidateId,
    delay: Duration,
}

#[async_trait]
impl ComicSource for Remote {
    async fn fetch(&self, id: CandidateId) -> FetchOutcome {
        tokio::time::sleep(self.delay).await;
        if id == 4 {
            return FetchOutcome::transient(id, FetchFailure::Status(502));
        }
        if id >= self.bound {
            return FetchOutcome::NotFound;
        }
        FetchOutcome::Found(comic(id, "Rocket launch", "Gravity always wins"))
    }
}

fn comic(id: CandidateId, title: &str, alt: &str) -> RemoteComic {
    RemoteComic {
        num: id,
        title: title.into(),
        alt: alt.into(),
        img: format!("https://imgs.example/{id}.png"),
        ..Default::default()
    }
}

fn seeded_store(dir: &TempDir) -> Arc<dyn ComicStore> {
    let store = JsonStore::open(StorePaths::new(dir.path().join("db.json"))).unwrap();
    for c in [
        comic(1, "Moon landing", "A rocket reaches the moon"),
        comic(2, "Rocket science", "Not that hard"),
        comic(3, "Moon phases", "Waxing and waning"),
    ] {
        store.add_one(ComicRecord::from_remote(&c).unwrap()).unwrap();
    }
    store.flush().unwrap();
    Arc::new(store)
}

fn app_with(store: Arc<dyn ComicStore>, remote: Remote, shutdown: CancellationToken) -> Router {
    let settings = PipelineSettings { parallelism: 2, saturation_threshold: 5 };
    let pipeline = Arc::new(Pipeline::new(Arc::new(remote), store, settings));
    build_app(AppState { pipeline, admin_token: Some(TOKEN.into()), shutdown })
}

fn app(store: Arc<dyn ComicStore>) -> Router {
    app_with(store, Remote { bound: 10, delay: Duration::ZERO }, CancellationToken::new())
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Bytes) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn update(token: Option<&str>) -> Request<Body> {
    let mut req = Request::post("/update");
    if let Some(t) = token {
        req = req.header(ADMIN_TOKEN_HEADER, t);
    }
    req.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn search_returns_ranked_urls() {
    let dir = tempdir().unwrap();
    let (status, body) = call(app(seeded_store(&dir)), get("/pics?search=moon%20rockets")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    let urls: Vec<&str> = json["urls"].as_array().unwrap().iter().map(|u| u.as_str().unwrap()).collect();
    assert_eq!(
        urls,
        vec!["https://imgs.example/1.png", "https://imgs.example/2.png", "https://imgs.example/3.png"]
    );
}

#[tokio::test]
async fn search_without_matches_is_404() {
    let dir = tempdir().unwrap();
    let (status, _) = call(app(seeded_store(&dir)), get("/pics?search=zebra")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(app(seeded_store(&dir)), get("/pics")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn comic_by_id() {
    let dir = tempdir().unwrap();
    let store = seeded_store(&dir);
    let (status, body) = call(app(store.clone()), get("/comics/2")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["url"], "https://imgs.example/2.png");

    let (status, _) = call(app(store), get("/comics/99")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn comic_by_id_from_sled_store() {
    let dir = tempdir().unwrap();
    let sled = SledStore::open(dir.path().join("sled")).unwrap();
    sled.add_one(ComicRecord::from_remote(&comic(42, "Answer", "Deep thought")).unwrap()).unwrap();
    sled.flush().unwrap();
    let store: Arc<dyn ComicStore> = Arc::new(sled);

    let (status, body) = call(app(store.clone()), get("/comics/42")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["id"], "42");

    let (status, _) = call(app(store), get("/comics/43")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_requires_admin_token() {
    let dir = tempdir().unwrap();
    let store = seeded_store(&dir);
    let (status, _) = call(app(store.clone()), update(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(app(store.clone()), update(Some("wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(store.records().unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn update_fetches_missing_comics() {
    let dir = tempdir().unwrap();
    let store = seeded_store(&dir);
    let (status, body) = call(app(store.clone()), update(Some(TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    // 1..=3 were seeded, 4 failed, 5..=9 are new
    assert_eq!(json["new"], 5);
    assert_eq!(json["total"], 8);
    let errors = json["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().starts_with("id 4"));

    let (status, body) = call(app(store), get("/pics?search=gravity")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["urls"].as_array().unwrap().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn update_interrupted_by_shutdown_is_503() {
    let dir = tempdir().unwrap();
    let shutdown = CancellationToken::new();
    let app = app_with(seeded_store(&dir), Remote { bound: 10, delay: Duration::from_secs(30) }, shutdown.clone());

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let (status, body) = tokio::time::timeout(Duration::from_secs(5), call(app, update(Some(TOKEN)))).await.unwrap();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn health_is_ok() {
    let dir = tempdir().unwrap();
    let (status, body) = call(app(seeded_store(&dir)), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");
}
