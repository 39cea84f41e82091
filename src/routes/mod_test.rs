use axum::body::Body;
use axum::http::Request;
use tower::ServiceExt;

use super::*;

const SHELL: &str = "<!doctype html><div id=\"root\"></div>";

fn dist_with_shell() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(SHELL_FILE), SHELL).unwrap();
    std::fs::create_dir(dir.path().join("assets")).unwrap();
    std::fs::write(dir.path().join("assets").join("app.js"), "console.log(1)").unwrap();
    dir
}

async fn get_path(router: Router, path: &str) -> (StatusCode, Option<String>, String) {
    let req = Request::builder().method("GET").uri(path).body(Body::empty()).unwrap();
    let res = router.oneshot(req).await.unwrap();
    let status = res.status();
    let content_type = res
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_owned());
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn existing_asset_is_served() {
    let dist = dist_with_shell();
    let (status, content_type, body) = get_path(app(dist.path()), "/assets/app.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().contains("javascript"));
    assert_eq!(body, "console.log(1)");
}

#[tokio::test]
async fn root_serves_shell() {
    let dist = dist_with_shell();
    let (status, content_type, body) = get_path(app(dist.path()), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/html"));
    assert_eq!(body, SHELL);
}

#[tokio::test]
async fn unknown_route_falls_back_to_shell() {
    let dist = dist_with_shell();
    for path in ["/projects/42/chat", "/admin/login", "/assets/missing.js"] {
        let (status, content_type, body) = get_path(app(dist.path()), path).await;
        assert_eq!(status, StatusCode::OK, "path {path}");
        assert!(content_type.unwrap().starts_with("text/html"), "path {path}");
        assert_eq!(body, SHELL, "path {path}");
    }
}

#[tokio::test]
async fn missing_shell_is_500_plain_text() {
    let dist = tempfile::tempdir().unwrap();
    let (status, content_type, body) = get_path(app(dist.path()), "/dashboard").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(content_type.unwrap().starts_with("text/plain"));
    assert_eq!(body, "Error loading index.html");
}

#[tokio::test]
async fn missing_dist_dir_is_500_not_panic() {
    let dist = tempfile::tempdir().unwrap();
    let missing = dist.path().join("never-built");
    let (status, _, body) = get_path(app(&missing), "/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Error loading index.html");
}

#[tokio::test]
async fn shell_is_reread_after_rebuild() {
    let dist = tempfile::tempdir().unwrap();
    let router = app(dist.path());
    let (status, _, _) = get_path(router.clone(), "/x").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    std::fs::write(dist.path().join(SHELL_FILE), SHELL).unwrap();
    let (status, _, body) = get_path(router, "/x").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, SHELL);
}

#[tokio::test]
async fn healthz_is_ok() {
    let dist = tempfile::tempdir().unwrap();
    let (status, _, _) = get_path(app(dist.path()), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
}
