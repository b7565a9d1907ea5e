use super::*;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn test_http_client_builds() {
    let _client = http_client(Duration::from_secs(30));
}

#[tokio::test]
async fn test_limited_text_under_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
        .mount(&server)
        .await;
    let resp = Client::new().get(server.uri()).send().await.unwrap();
    let text = limited_text(resp, 1024).await.unwrap();
    assert_eq!(text, "hello world");
}

#[tokio::test]
async fn test_limited_text_rejects_large_content_length() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 200]))
        .mount(&server)
        .await;
    let resp = Client::new().get(server.uri()).send().await.unwrap();
    let result = limited_text(resp, 100).await;
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("too large"));
}
