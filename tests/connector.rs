//! End-to-end tests of the hyper connector against raw TCP backends.

use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderValue, LOCATION, USER_AGENT};
use http::{Method, StatusCode, Uri};
use tokio::sync::oneshot;

use restlink::config::keys;
use restlink::connector::redirect::{RedirectAttempt, RedirectController};
use restlink::{
    callback, Client, ClientConfig, ConnectorError, Entity, HyperConfiguration, HyperConnectorProvider,
    StatusFamily,
};

mod common;

use common::response;

fn uri(addr: std::net::SocketAddr, path: &str) -> Uri {
    format!("http://{}{}", addr, path).parse().unwrap()
}

fn client_with(configuration: HyperConfiguration, config: ClientConfig) -> Client {
    Client::with_provider(config, &HyperConnectorProvider::with_configuration(configuration)).unwrap()
}

#[tokio::test]
async fn test_get_maps_response() {
    let (addr, mut requests) = common::start_recording_backend(|_| {
        response("200 OK", &[("X-Backend", "one"), ("X-Backend", "two")], "hello")
    })
    .await;

    let client = Client::new(
        ClientConfig::new().default_header(USER_AGENT, HeaderValue::from_static("restlink-test")),
    )
    .unwrap();
    let request = client
        .request(Method::GET, uri(addr, "/greeting?lang=en"))
        .header(http::header::ACCEPT, HeaderValue::from_static("text/plain"));

    let response = client.execute(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.reason(), Some("OK"));
    assert_eq!(response.family(), StatusFamily::Successful);
    assert_eq!(response.resolved_uri(), &uri(addr, "/greeting?lang=en"));
    assert_eq!(response.headers().get_all("x-backend").iter().count(), 2);
    assert!(response.has_entity());
    assert_eq!(response.text().await.unwrap(), "hello");

    let recorded = requests.recv().await.unwrap();
    assert_eq!(recorded.method, "GET");
    assert_eq!(recorded.target, "/greeting?lang=en");
    assert_eq!(recorded.header("user-agent"), Some("restlink-test"));
    assert_eq!(recorded.header("accept"), Some("text/plain"));
}

#[tokio::test]
async fn test_empty_response_has_no_entity() {
    let (addr, _requests) = common::start_recording_backend(|_| response("204 No Content", &[], "")).await;
    let client = Client::new(ClientConfig::new()).unwrap();

    let response = client.execute(client.request(Method::DELETE, uri(addr, "/item/1"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!response.has_entity());
}

#[tokio::test]
async fn test_buffered_entity_has_content_length() {
    let (addr, mut requests) = common::start_recording_backend(|_| response("201 Created", &[], "")).await;
    let client = Client::new(ClientConfig::new()).unwrap();

    let request = client
        .request(Method::POST, uri(addr, "/items"))
        .body(Entity::streaming(|out: &mut dyn Write| out.write_all(b"name=widget")));
    let response = client.execute(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let recorded = requests.recv().await.unwrap();
    assert_eq!(recorded.header("content-length"), Some("11"));
    assert!(recorded.header("transfer-encoding").is_none());
    assert_eq!(recorded.body, b"name=widget");
}

#[tokio::test]
async fn test_chunked_entity_is_streamed_in_chunk_size_pieces() {
    let (addr, mut requests) = common::start_recording_backend(|_| response("200 OK", &[], "")).await;
    let client = Client::new(
        ClientConfig::new()
            .property(keys::REQUEST_ENTITY_PROCESSING, "CHUNKED")
            .property(keys::CHUNKED_ENCODING_SIZE, 1000),
    )
    .unwrap();

    let request = client.request(Method::PUT, uri(addr, "/upload")).body(Entity::streaming(
        |out: &mut dyn Write| {
            for _ in 0..5 {
                out.write_all(&[b'x'; 500])?;
            }
            Ok(())
        },
    ));
    client.execute(request).await.unwrap();

    let recorded = requests.recv().await.unwrap();
    assert_eq!(recorded.header("transfer-encoding"), Some("chunked"));
    assert_eq!(recorded.chunks, vec![1000, 1000, 500]);
    assert_eq!(recorded.body.len(), 2500);
}

#[tokio::test]
async fn test_fixed_length_streaming_wins_over_chunking() {
    let (addr, mut requests) = common::start_recording_backend(|_| response("200 OK", &[], "")).await;
    let configuration = HyperConfiguration::with_defaults()
        .request_entity_processing(restlink::config::RequestEntityProcessing::Chunked)
        .fixed_length_streaming(true);
    let client = client_with(configuration, ClientConfig::new());

    let request = client.request(Method::POST, uri(addr, "/fixed")).body(
        Entity::streaming(|out: &mut dyn Write| out.write_all(&[b'y'; 3000])).with_length(3000),
    );
    client.execute(request).await.unwrap();

    let recorded = requests.recv().await.unwrap();
    assert_eq!(recorded.header("content-length"), Some("3000"));
    assert!(recorded.header("transfer-encoding").is_none());
    assert_eq!(recorded.body.len(), 3000);
}

#[tokio::test]
async fn test_expect_continue_above_threshold() {
    let (addr, mut requests) = common::start_recording_backend(|_| response("200 OK", &[], "")).await;
    let configuration = HyperConfiguration::with_defaults()
        .expect_100_continue(true)
        .expect_100_continue_threshold(10);
    let client = client_with(configuration, ClientConfig::new());

    client
        .execute(client.request(Method::POST, uri(addr, "/small")).body(Entity::text("tiny")))
        .await
        .unwrap();
    client
        .execute(
            client
                .request(Method::POST, uri(addr, "/large"))
                .body(Entity::text("a body longer than ten bytes")),
        )
        .await
        .unwrap();

    let small = requests.recv().await.unwrap();
    let large = requests.recv().await.unwrap();
    assert!(small.header("expect").is_none());
    assert_eq!(large.header("expect"), Some("100-continue"));
}

#[tokio::test]
async fn test_redirect_is_followed() {
    let (addr, mut requests) = common::start_recording_backend(|request| match request.path() {
        "/start" => response("302 Found", &[("Location", "/final")], ""),
        _ => response("200 OK", &[], "arrived"),
    })
    .await;
    let client = Client::new(ClientConfig::new()).unwrap();

    let response = client.execute(client.request(Method::GET, uri(addr, "/start"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.resolved_uri(), &uri(addr, "/final"));
    assert_eq!(response.text().await.unwrap(), "arrived");

    assert_eq!(requests.recv().await.unwrap().target, "/start");
    assert_eq!(requests.recv().await.unwrap().target, "/final");
}

#[tokio::test]
async fn test_see_other_turns_post_into_get() {
    let (addr, mut requests) = common::start_recording_backend(|request| match request.path() {
        "/form" => response("303 See Other", &[("Location", "/result")], ""),
        _ => response("200 OK", &[], "done"),
    })
    .await;
    let client = Client::new(ClientConfig::new()).unwrap();

    let request = client.request(Method::POST, uri(addr, "/form")).body(Entity::text("a=1"));
    let response = client.execute(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let first = requests.recv().await.unwrap();
    let second = requests.recv().await.unwrap();
    assert_eq!(first.method, "POST");
    assert_eq!(second.method, "GET");
    assert!(second.body.is_empty());
    assert!(second.header("content-length").map_or(true, |v| v == "0"));
}

#[tokio::test]
async fn test_redirects_disabled_per_request() {
    let (addr, _requests) =
        common::start_recording_backend(|_| response("301 Moved Permanently", &[("Location", "/elsewhere")], ""))
            .await;
    let client = Client::new(ClientConfig::new()).unwrap();

    let request = client
        .request(Method::GET, uri(addr, "/old"))
        .property(keys::FOLLOW_REDIRECTS, false);
    let response = client.execute(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.family(), StatusFamily::Redirection);
    assert_eq!(response.headers().get(LOCATION).unwrap(), "/elsewhere");
}

#[tokio::test]
async fn test_redirect_loop_hits_limit() {
    let (addr, _requests) =
        common::start_recording_backend(|_| response("307 Temporary Redirect", &[("Location", "/again")], "")).await;
    let client = client_with(HyperConfiguration::with_defaults().max_redirects(2), ClientConfig::new());

    let result = client.execute(client.request(Method::GET, uri(addr, "/again"))).await;
    assert!(matches!(result, Err(ConnectorError::TooManyRedirects(2))));
}

#[derive(Debug)]
struct CountingVeto(Arc<AtomicU32>);

impl RedirectController for CountingVeto {
    fn follow(&self, _attempt: &RedirectAttempt<'_>) -> bool {
        self.0.fetch_add(1, Ordering::SeqCst);
        false
    }
}

#[tokio::test]
async fn test_redirect_controller_veto() {
    let (addr, _requests) =
        common::start_recording_backend(|_| response("302 Found", &[("Location", "/next")], "")).await;
    let consulted = Arc::new(AtomicU32::new(0));
    let configuration =
        HyperConfiguration::with_defaults().redirect_controller(Arc::new(CountingVeto(consulted.clone())));
    let client = client_with(configuration, ClientConfig::new());

    let response = client.execute(client.request(Method::GET, uri(addr, "/first"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(consulted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_plain_http_through_proxy() {
    let (proxy, mut requests) = common::start_recording_backend(|_| response("200 OK", &[], "via proxy")).await;
    let client = Client::new(
        ClientConfig::new()
            .property(keys::PROXY_URI, format!("http://{}", proxy))
            .property(keys::PROXY_USERNAME, "scott")
            .property(keys::PROXY_PASSWORD, "tiger"),
    )
    .unwrap();

    let target: Uri = "http://service.invalid/resource".parse().unwrap();
    let response = client.execute(client.request(Method::GET, target)).await.unwrap();
    assert_eq!(response.text().await.unwrap(), "via proxy");

    let recorded = requests.recv().await.unwrap();
    assert_eq!(recorded.target, "http://service.invalid/resource");
    assert_eq!(recorded.header("proxy-authorization"), Some("Basic c2NvdHQ6dGlnZXI="));
}

#[tokio::test]
async fn test_request_level_null_proxy_disables_connector_proxy() {
    let (addr, mut requests) = common::start_recording_backend(|_| response("200 OK", &[], "direct")).await;
    let unreachable = common::refused_address().await;
    let configuration = HyperConfiguration::with_defaults()
        .proxy_uri(format!("http://{}", unreachable).parse().unwrap());
    let client = client_with(configuration, ClientConfig::new());

    let proxied = client.execute(client.request(Method::GET, uri(addr, "/proxied"))).await;
    assert!(matches!(proxied, Err(ConnectorError::Connect(_))));

    let mut direct = HyperConfiguration::new();
    direct.core_mut().proxy_uri.set(None);
    let mut request = client.request(Method::GET, uri(addr, "/direct"));
    request.properties_mut().set_configuration(direct);

    let response = client.execute(request).await.unwrap();
    assert_eq!(response.text().await.unwrap(), "direct");
    assert_eq!(requests.recv().await.unwrap().target, "/direct");
}

#[tokio::test]
async fn test_read_timeout() {
    let addr = common::start_silent_backend().await;
    let client = Client::new(ClientConfig::new().property(keys::READ_TIMEOUT, 150)).unwrap();

    let result = client.execute(client.request(Method::GET, uri(addr, "/slow"))).await;
    assert!(matches!(result, Err(ConnectorError::Timeout(d)) if d == Duration::from_millis(150)));
}

#[tokio::test]
async fn test_request_property_overrides_client_timeout() {
    let addr = common::start_silent_backend().await;
    let client = Client::new(ClientConfig::new().property(keys::READ_TIMEOUT, 60_000)).unwrap();

    let request = client
        .request(Method::GET, uri(addr, "/slow"))
        .property(keys::READ_TIMEOUT, 100);
    let result = client.execute(request).await;
    assert!(matches!(result, Err(ConnectorError::Timeout(d)) if d == Duration::from_millis(100)));
}

#[tokio::test]
async fn test_request_header_limit_overrides_cached_transport() {
    let big = "x".repeat(20_000);
    let (addr, _requests) =
        common::start_recording_backend(move |_| response("200 OK", &[("X-Big", big.as_str())], "ok")).await;
    let client = Client::new(ClientConfig::new()).unwrap();

    let result = client.execute(client.request(Method::GET, uri(addr, "/"))).await;
    assert!(matches!(result, Err(ConnectorError::Transport(_))));

    let request = client
        .request(Method::GET, uri(addr, "/"))
        .property(keys::MAX_HEADER_SIZE, 100_000);
    let response = client.execute(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-big"].len(), 20_000);

    // the enlarged buffer stays with that request
    let result = client.execute(client.request(Method::GET, uri(addr, "/"))).await;
    assert!(matches!(result, Err(ConnectorError::Transport(_))));
}

#[tokio::test]
async fn test_request_override_object_beats_client_header_limit() {
    let big = "x".repeat(20_000);
    let (addr, _requests) =
        common::start_recording_backend(move |_| response("200 OK", &[("X-Big", big.as_str())], "ok")).await;
    let client = client_with(
        HyperConfiguration::with_defaults().max_header_size(100_000),
        ClientConfig::new(),
    );

    let response = client.execute(client.request(Method::GET, uri(addr, "/"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut request = client.request(Method::GET, uri(addr, "/"));
    request
        .properties_mut()
        .set_configuration(HyperConfiguration::new().max_header_size(1024));
    let result = client.execute(request).await;
    assert!(matches!(result, Err(ConnectorError::Transport(_))));
}

#[tokio::test]
async fn test_connection_refused() {
    let addr = common::refused_address().await;
    let client = Client::new(ClientConfig::new()).unwrap();

    let result = client.execute(client.request(Method::GET, uri(addr, "/"))).await;
    assert!(matches!(result, Err(ConnectorError::Connect(_))));
}

#[tokio::test]
async fn test_async_success_calls_response_once() {
    let addr = common::start_mock_backend("async body").await;
    let client = Client::new(ClientConfig::new()).unwrap();
    let failures = Arc::new(AtomicU32::new(0));
    let (tx, rx) = oneshot::channel();

    let failed = failures.clone();
    let handle = client.execute_async(
        client.request(Method::GET, uri(addr, "/async")),
        callback(
            move |response| {
                let _ = tx.send(response.status());
            },
            move |_| {
                failed.fetch_add(1, Ordering::SeqCst);
            },
        ),
    );

    handle.join().await.unwrap();
    assert_eq!(rx.await.unwrap(), StatusCode::OK);
    assert_eq!(failures.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_async_failure_calls_failure_once() {
    let addr = common::refused_address().await;
    let client = Client::new(ClientConfig::new()).unwrap();
    let responses = Arc::new(AtomicU32::new(0));
    let failures = Arc::new(AtomicU32::new(0));

    let (seen_responses, seen_failures) = (responses.clone(), failures.clone());
    let handle = client.execute_async(
        client.request(Method::GET, uri(addr, "/")),
        callback(
            move |_| {
                seen_responses.fetch_add(1, Ordering::SeqCst);
            },
            move |error| {
                assert!(matches!(error, ConnectorError::Connect(_)));
                seen_failures.fetch_add(1, Ordering::SeqCst);
            },
        ),
    );

    handle.join().await.unwrap();
    assert_eq!(responses.load(Ordering::SeqCst), 0);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_closed_connector_rejects_requests() {
    let addr = common::start_mock_backend("unused").await;
    let client = Client::new(ClientConfig::new()).unwrap();
    client.close();

    let result = client.execute(client.request(Method::GET, uri(addr, "/"))).await;
    assert!(matches!(result, Err(ConnectorError::Closed)));

    let failures = Arc::new(AtomicU32::new(0));
    let seen = failures.clone();
    let handle = client.execute_async(
        client.request(Method::GET, uri(addr, "/")),
        callback(|_| {}, move |error| {
            assert!(matches!(error, ConnectorError::Closed));
            seen.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert!(handle.is_finished());
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_relative_uri_is_rejected() {
    let client = Client::new(ClientConfig::new()).unwrap();
    let result = client.execute(client.request(Method::GET, Uri::from_static("/relative"))).await;
    assert!(matches!(result, Err(ConnectorError::InvalidRequest(_))));
}
