//! HTTP probe classification against a live mock server

use std::time::Duration;

use watchdog::HttpMethod;
use watchdog::actors::probe::{HttpProber, Prober};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::snapshot;

fn prober() -> HttpProber {
    HttpProber::new(Duration::from_millis(500)).unwrap()
}

#[tokio::test]
async fn server_error_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let target = snapshot(1, &format!("{}/health", server.uri()), HttpMethod::Get);
    assert!(!prober().probe(&target).await);
}

#[tokio::test]
async fn any_2xx_is_a_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let target = snapshot(1, &server.uri(), HttpMethod::Get);
    assert!(prober().probe(&target).await);
}

#[tokio::test]
async fn redirect_target_counts_by_final_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("Location", format!("{}/new", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let target = snapshot(1, &format!("{}/old", server.uri()), HttpMethod::Get);
    assert!(!prober().probe(&target).await);
}

#[tokio::test]
async fn refused_connection_is_a_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let target = snapshot(1, &format!("http://127.0.0.1:{port}/"), HttpMethod::Get);
    assert!(!prober().probe(&target).await);
}

#[tokio::test]
async fn slow_response_times_out_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let target = snapshot(1, &server.uri(), HttpMethod::Get);
    assert!(!prober().probe(&target).await);
}

#[tokio::test]
async fn configured_method_is_used() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;

    let target = snapshot(1, &server.uri(), HttpMethod::Patch);
    assert!(prober().probe(&target).await);
}
