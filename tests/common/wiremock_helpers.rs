use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serves `html` at `url_path` with a text/html content type.
pub async fn mock_html_page(url_path: &str, html: &str) -> MockServer {
    let server = MockServer::start().await;
    mount_html(&server, url_path, html).await;
    server
}

pub async fn mount_html(server: &MockServer, url_path: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html.to_string())
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

/// Mounts a chain of 302s: `hops[0] -> hops[1] -> ... -> landing`.
/// Locations are relative so they resolve against the mock server.
pub async fn mount_redirect_chain(server: &MockServer, hops: &[&str], landing: &str) {
    for (i, hop) in hops.iter().enumerate() {
        let next = hops.get(i + 1).copied().unwrap_or(landing);
        Mock::given(method("GET"))
            .and(path(*hop))
            .respond_with(ResponseTemplate::new(302).insert_header("location", next))
            .mount(server)
            .await;
    }
}

/// Every request answers with `status_code`.
pub async fn mock_error_server(status_code: u16) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status_code))
        .mount(&server)
        .await;

    server
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_html_page_serves_html() {
        let server = mock_html_page("/login", "<html><body>Sign in</body></html>").await;

        let response = reqwest::get(format!("{}/login", server.uri())).await.unwrap();

        assert_eq!(response.status(), 200);
        assert!(response.text().await.unwrap().contains("Sign in"));
    }

    #[tokio::test]
    async fn test_redirect_chain_points_at_next_hop() {
        let server = MockServer::start().await;
        mount_redirect_chain(&server, &["/a", "/b"], "/end").await;

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let response = client.get(format!("{}/b", server.uri())).send().await.unwrap();

        assert_eq!(response.status(), 302);
        assert_eq!(response.headers()["location"], "/end");
    }
}
