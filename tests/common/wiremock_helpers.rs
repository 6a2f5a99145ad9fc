use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a mock site that answers HEAD with 200 on `existing` paths.
///
/// Every other path falls through to wiremock's default 404.
pub async fn mock_site_with_paths(existing: &[&str]) -> MockServer {
    let server = MockServer::start().await;

    for p in existing {
        Mock::given(method("HEAD"))
            .and(path(*p))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
    }

    server
}

/// Creates a mock site where `url_path` answers HEAD with `status`.
pub async fn mock_site_with_status(url_path: &str, status: u16) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;

    server
}
