//! `HttpConfirmationClient` against a mock validate endpoint.

use std::time::Duration;

use payfast::{ConfirmationClient, HttpConfirmationClient, ItnError, Stage};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PARAMS: &str = "m_payment_id=SuperUnique1&amount_gross=200.00&merchant_id=10012577";

async fn client_for(server: &MockServer, timeout: Duration) -> HttpConfirmationClient {
    HttpConfirmationClient::new(format!("{}/eng/query/validate", server.uri()), timeout).unwrap()
}

#[tokio::test]
async fn posts_param_string_and_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/eng/query/validate"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string(PARAMS))
        .respond_with(ResponseTemplate::new(200).set_body_string("VALID"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5)).await;
    assert_eq!(client.confirm(PARAMS).await.unwrap(), "VALID");
}

#[tokio::test]
async fn invalid_body_is_returned_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("INVALID"))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5)).await;
    assert_eq!(client.confirm(PARAMS).await.unwrap(), "INVALID");
}

#[tokio::test]
async fn slow_gateway_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("VALID")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_millis(200)).await;
    let err = client.confirm(PARAMS).await.unwrap_err();
    assert!(matches!(err, ItnError::Timeout(Stage::Confirmation)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn unreachable_gateway_is_transport_error() {
    // Port 9 (discard) on localhost is not listening in test environments.
    let client =
        HttpConfirmationClient::new("http://127.0.0.1:9/eng/query/validate", Duration::from_secs(2))
            .unwrap();
    let err = client.confirm(PARAMS).await.unwrap_err();
    assert!(matches!(
        err,
        ItnError::Confirmation(_) | ItnError::Timeout(Stage::Confirmation)
    ));
}
