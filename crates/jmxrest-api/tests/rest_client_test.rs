#![allow(clippy::unwrap_used)]
// Integration tests for `RestClient` and `NotificationInbox` using wiremock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{basic_auth, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jmxrest_api::notifications::{InboxConfig, InboxSink, NotificationInbox, ReconnectConfig, run_inbox};
use jmxrest_api::{BasicAuth, Error, NotificationRecord, NotificationSettings, RestClient};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let root = Url::parse(&format!("{}/IBMJMXConnectorREST", server.uri())).unwrap();
    let auth = BasicAuth {
        username: "admin".into(),
        password: "s3cret".to_string().into(),
    };
    let client = RestClient::with_client(reqwest::Client::new(), root, Some(auth));
    (server, client)
}

fn server_info() -> serde_json::Value {
    json!({
        "version": 5,
        "mbeans": "/IBMJMXConnectorREST/mbeans",
        "createMBean": "/IBMJMXConnectorREST/mbeans/factory",
        "mbeanCount": "/IBMJMXConnectorREST/mbeanCount",
        "defaultDomain": "/IBMJMXConnectorREST/defaultDomain",
        "domains": "/IBMJMXConnectorREST/domains",
        "notifications": "/IBMJMXConnectorREST/notifications",
        "instanceOf": "/IBMJMXConnectorREST/instanceOf"
    })
}

fn area(id: u32) -> serde_json::Value {
    json!({
        "registrations": format!("/IBMJMXConnectorREST/notifications/{id}/registrations"),
        "serverRegistrations": format!("/IBMJMXConnectorREST/notifications/{id}/serverRegistrations"),
        "inbox": format!("/IBMJMXConnectorREST/notifications/{id}/inbox"),
        "client": format!("/IBMJMXConnectorREST/notifications/{id}")
    })
}

fn settings() -> NotificationSettings {
    NotificationSettings {
        delivery_interval: 0,
        inbox_expiry: 300_000,
    }
}

#[derive(Default)]
struct RecordingSink {
    records: Mutex<Vec<NotificationRecord>>,
    subscriptions: Vec<String>,
    stopped: Mutex<Option<String>>,
}

impl InboxSink for RecordingSink {
    fn deliver(&self, records: Vec<NotificationRecord>) {
        self.records.lock().unwrap().extend(records);
    }

    fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.clone()
    }

    fn stopped(&self, error: &Error) {
        *self.stopped.lock().unwrap() = Some(error.to_string());
    }
}

// ── Handshake ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_server_info_sends_credentials_and_version() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/IBMJMXConnectorREST"))
        .and(basic_auth("admin", "s3cret"))
        .and(header("X-JMX-REST-Client-Version", "jmxrest_client_v5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(server_info()))
        .expect(1)
        .mount(&server)
        .await;

    let info = client.server_info().await.unwrap();
    assert_eq!(info.version, 5);
    assert_eq!(info.domains, "/IBMJMXConnectorREST/domains");
}

#[tokio::test]
async fn test_unauthorized_is_authentication_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/IBMJMXConnectorREST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client.server_info().await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_forbidden_is_authentication_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/IBMJMXConnectorREST"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    assert!(client.server_info().await.unwrap_err().is_auth_failure());
}

#[tokio::test]
async fn test_server_error_carries_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/IBMJMXConnectorREST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client.server_info().await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/IBMJMXConnectorREST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let result = client.server_info().await;
    assert!(matches!(result, Err(Error::Deserialization { ref body, .. }) if body == "<html>"));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let root = Url::parse("http://127.0.0.1:1/IBMJMXConnectorREST").unwrap();
    let client = RestClient::with_client(reqwest::Client::new(), root, None);

    let err = client.server_info().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "got {err:?}");
    assert!(err.is_transient());
}

// ── Notification area ───────────────────────────────────────────────

#[tokio::test]
async fn test_open_subscribe_and_unsubscribe() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/IBMJMXConnectorREST/notifications"))
        .and(body_json(json!({ "deliveryInterval": 0, "inboxExpiry": 300_000 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(area(7)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/IBMJMXConnectorREST/notifications/7/registrations"))
        .and(body_json(json!({ "objectName": "WebSphere:type=JvmStats", "filters": [] })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/IBMJMXConnectorREST/notifications/7/registrations/WebSphere:type=JvmStats"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let inbox = NotificationInbox::open(
        client.clone(),
        client,
        "/IBMJMXConnectorREST/notifications",
        settings(),
    )
    .await
    .unwrap();

    assert_eq!(inbox.area().inbox, "/IBMJMXConnectorREST/notifications/7/inbox");
    inbox.subscribe("WebSphere:type=JvmStats").await.unwrap();
    inbox.unsubscribe("WebSphere:type=JvmStats").await.unwrap();
}

#[tokio::test]
async fn test_gone_inbox_maps_to_area_gone() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/IBMJMXConnectorREST/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(area(1)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/IBMJMXConnectorREST/notifications/1/inbox"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let inbox = NotificationInbox::open(client.clone(), client, "/IBMJMXConnectorREST/notifications", settings())
        .await
        .unwrap();

    let result = inbox.fetch().await;
    assert!(matches!(result, Err(Error::NotificationAreaGone { status: 410 })));
}

#[tokio::test]
async fn test_inbox_loop_delivers_batches_until_cancelled() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/IBMJMXConnectorREST/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(area(3)))
        .mount(&server)
        .await;

    let batch = json!([
        { "type": "jmx.attribute.change", "source": "A:type=x", "sequenceNumber": 1 },
        { "type": "jmx.attribute.change", "source": "A:type=x", "sequenceNumber": 2 }
    ]);

    Mock::given(method("GET"))
        .and(path("/IBMJMXConnectorREST/notifications/3/inbox"))
        .respond_with(ResponseTemplate::new(200).set_body_json(batch))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/IBMJMXConnectorREST/notifications/3/inbox"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let inbox = Arc::new(
        NotificationInbox::open(client.clone(), client, "/IBMJMXConnectorREST/notifications", settings())
            .await
            .unwrap(),
    );
    let sink = Arc::new(RecordingSink::default());
    let cancel = CancellationToken::new();

    let config = InboxConfig {
        fetch_interval: Duration::from_millis(10),
        ..InboxConfig::default()
    };
    let task = tokio::spawn(run_inbox(inbox, sink.clone(), config, cancel.clone()));

    for _ in 0..100 {
        if sink.records.lock().unwrap().len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    cancel.cancel();
    task.await.unwrap();
    assert!(sink.stopped.lock().unwrap().is_none(), "cancellation is not a failure");

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].sequence_number, 1);
    assert_eq!(records[1].sequence_number, 2);
}

#[tokio::test]
async fn test_inbox_loop_recreates_lost_area_and_restores_subscriptions() {
    let (server, client) = setup().await;

    // First area, then the recreated one.
    Mock::given(method("POST"))
        .and(path("/IBMJMXConnectorREST/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(area(1)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/IBMJMXConnectorREST/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(area(2)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/IBMJMXConnectorREST/notifications/1/inbox"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/IBMJMXConnectorREST/notifications/2/registrations"))
        .and(body_json(json!({ "objectName": "A:type=x", "filters": [] })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/IBMJMXConnectorREST/notifications/2/inbox"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "type": "restored", "source": "A:type=x", "sequenceNumber": 9 }
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/IBMJMXConnectorREST/notifications/2/inbox"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let inbox = Arc::new(
        NotificationInbox::open(client.clone(), client, "/IBMJMXConnectorREST/notifications", settings())
            .await
            .unwrap(),
    );
    let sink = Arc::new(RecordingSink {
        records: Mutex::new(Vec::new()),
        subscriptions: vec!["A:type=x".into()],
        stopped: Mutex::new(None),
    });
    let cancel = CancellationToken::new();
    let config = InboxConfig {
        fetch_interval: Duration::from_millis(10),
        ..InboxConfig::default()
    };
    let task = tokio::spawn(run_inbox(inbox.clone(), sink.clone(), config, cancel.clone()));

    for _ in 0..200 {
        if !sink.records.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    cancel.cancel();
    task.await.unwrap();

    assert_eq!(inbox.area().inbox, "/IBMJMXConnectorREST/notifications/2/inbox");
    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].notification_type, "restored");
}

#[tokio::test]
async fn test_inbox_loop_stops_on_auth_failure() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/IBMJMXConnectorREST/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(area(5)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/IBMJMXConnectorREST/notifications/5/inbox"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let inbox = Arc::new(
        NotificationInbox::open(client.clone(), client, "/IBMJMXConnectorREST/notifications", settings())
            .await
            .unwrap(),
    );
    let sink = Arc::new(RecordingSink::default());

    // Loop exits by itself; no cancellation needed.
    tokio::time::timeout(
        Duration::from_secs(5),
        run_inbox(inbox, sink.clone(), InboxConfig::default(), CancellationToken::new()),
    )
    .await
    .unwrap();

    let reason = sink.stopped.lock().unwrap().clone().unwrap();
    assert!(reason.contains("Authentication failed"), "got {reason}");
}

#[tokio::test]
async fn test_inbox_loop_reports_exhausted_retries() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/IBMJMXConnectorREST/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(area(6)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/IBMJMXConnectorREST/notifications/6/inbox"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let inbox = Arc::new(
        NotificationInbox::open(client.clone(), client, "/IBMJMXConnectorREST/notifications", settings())
            .await
            .unwrap(),
    );
    let sink = Arc::new(RecordingSink::default());
    let config = InboxConfig {
        fetch_interval: Duration::ZERO,
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            max_retries: Some(2),
        },
    };

    tokio::time::timeout(
        Duration::from_secs(5),
        run_inbox(inbox, sink.clone(), config, CancellationToken::new()),
    )
    .await
    .unwrap();

    let reason = sink.stopped.lock().unwrap().clone().unwrap();
    assert!(reason.contains("503"), "got {reason}");
}
