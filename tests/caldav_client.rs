//! Tests of the CalDAV client, against a mocked HTTP server

use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vtodo_sync::client::Client;
use vtodo_sync::config::ServerConfig;
use vtodo_sync::error::SyncError;
use vtodo_sync::remote::VersionTag;
use vtodo_sync::traits::CalDavTransport;

const CALENDAR_PATH: &str = "/dav/calendars/john/tasks/";

static REPORT_RESPONSE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:cal="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/dav/calendars/john/tasks/abc.ics</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>"etag-abc"</d:getetag>
        <cal:calendar-data>BEGIN:VCALENDAR
VERSION:2.0
PRODID:-//Nextcloud Tasks v0.13.6
BEGIN:VTODO
UID:abc
SUMMARY:Buy milk
STATUS:NEEDS-ACTION
END:VTODO
END:VCALENDAR
</cal:calendar-data>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/dav/calendars/john/tasks/def.ics</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>"etag-def"</d:getetag>
        <cal:calendar-data>BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VTODO
UID:def
SUMMARY:Call the plumber
STATUS:COMPLETED
END:VTODO
END:VCALENDAR
</cal:calendar-data>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

static ENTRY: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VTODO\r\nUID:abc\r\nSUMMARY:Buy milk\r\nSTATUS:NEEDS-ACTION\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";

fn client_for(server: &MockServer) -> Client {
    let calendar_url = Url::parse(&format!("{}{}", server.uri(), CALENDAR_PATH)).unwrap();
    Client::new(&ServerConfig {
        calendar_url,
        username: "john".to_string(),
        password: "secret".to_string(),
    })
}

fn is_unauthorized(err: &vtodo_sync::error::BoxError) -> bool {
    matches!(err.downcast_ref::<SyncError>(), Some(SyncError::Unauthorized(_)))
}

#[tokio::test]
async fn fetch_all_entries() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = MockServer::start().await;

    Mock::given(method("REPORT"))
        .and(path(CALENDAR_PATH))
        .and(header("Depth", "1"))
        .and(body_string_contains("calendar-data"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(REPORT_RESPONSE, "application/xml"))
        .mount(&server)
        .await;

    let entries = client_for(&server).fetch_all_entries().await.unwrap();
    assert_eq!(entries.len(), 2);

    let abc = &entries["abc"];
    assert_eq!(abc.href, "/dav/calendars/john/tasks/abc.ics");
    assert_eq!(abc.version_tag, VersionTag::from("\"etag-abc\""));
    assert!(abc.raw_text.contains("SUMMARY:Buy milk"));

    let def = &entries["def"];
    let todo = vtodo_sync::ical::read_remote(&def.raw_text).unwrap();
    assert!(todo.fields.completed);
}

#[tokio::test]
async fn create_entry() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/dav/calendars/john/tasks/abc.ics"))
        .and(header("If-None-Match", "*"))
        .respond_with(ResponseTemplate::new(201).insert_header("ETag", "\"new-etag\""))
        .expect(1)
        .mount(&server)
        .await;

    let created = client_for(&server).create_entry("abc", ENTRY).await.unwrap();
    assert_eq!(created.uid, "abc");
    assert_eq!(created.href, "/dav/calendars/john/tasks/abc.ics");
    assert_eq!(created.version_tag, VersionTag::from("\"new-etag\""));
}

#[tokio::test]
async fn missing_etags_are_fetched() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/dav/calendars/john/tasks/abc.ics"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dav/calendars/john/tasks/abc.ics"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"fetched\"").set_body_string(ENTRY))
        .mount(&server)
        .await;

    let created = client_for(&server).create_entry("abc", ENTRY).await.unwrap();
    assert_eq!(created.version_tag, VersionTag::from("\"fetched\""));
}

#[tokio::test]
async fn update_entry() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/dav/calendars/john/tasks/abc.ics"))
        .and(header("If-Match", "\"old\""))
        .respond_with(ResponseTemplate::new(204).insert_header("ETag", "\"newer\""))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/dav/calendars/john/tasks/abc.ics"))
        .and(header("If-Match", "\"stale\""))
        .respond_with(ResponseTemplate::new(412))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let href = "/dav/calendars/john/tasks/abc.ics";
    let tag = client.update_entry(href, &VersionTag::from("\"old\""), ENTRY).await.unwrap();
    assert_eq!(tag, VersionTag::from("\"newer\""));

    // A precondition failure only fails this entry
    let err = client.update_entry(href, &VersionTag::from("\"stale\""), ENTRY).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<SyncError>(), Some(SyncError::Transport(_))));
    assert!(SyncError::is_fatal_boxed(&err) == false);
}

#[tokio::test]
async fn fetch_entry_raw_text() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/dav/calendars/john/tasks/abc.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ENTRY))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dav/calendars/john/tasks/gone.ics"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.fetch_entry_raw_text("abc").await.unwrap().as_deref(), Some(ENTRY));
    assert_eq!(client.fetch_entry_raw_text("gone").await.unwrap(), None);
}

#[tokio::test]
async fn rejected_credentials_are_fatal() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = MockServer::start().await;

    Mock::given(method("REPORT"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.fetch_all_entries().await.unwrap_err();
    assert!(is_unauthorized(&err));
    assert!(SyncError::is_fatal_boxed(&err));

    let err = client.create_entry("abc", ENTRY).await.unwrap_err();
    assert!(is_unauthorized(&err));
}

#[tokio::test]
async fn entries_are_fetched_where_the_server_listed_them() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = MockServer::start().await;

    let listing = REPORT_RESPONSE.replace("/dav/calendars/john/tasks/abc.ics", "/dav/calendars/john/tasks/3F2A-written-by-another-client.ics");
    Mock::given(method("REPORT"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(listing, "application/xml"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dav/calendars/john/tasks/3F2A-written-by-another-client.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ENTRY))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let entries = client.fetch_all_entries().await.unwrap();
    assert_eq!(entries["abc"].href, "/dav/calendars/john/tasks/3F2A-written-by-another-client.ics");
    assert_eq!(client.fetch_entry_raw_text("abc").await.unwrap().as_deref(), Some(ENTRY));
}
