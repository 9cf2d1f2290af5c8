//! This module provides a client to connect to a CalDAV calendar

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use minidom::Element;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};

use crate::config::ServerConfig;
use crate::error::{BoxError, SyncError};
use crate::remote::{CreatedEntry, RemoteEntry, VersionTag};
use crate::resource::Resource;
use crate::traits::CalDavTransport;
use crate::utils::{find_elem, find_elems};

static TASKS_BODY: &str = r#"
    <c:calendar-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
        <d:prop>
            <d:getetag />
            <c:calendar-data />
        </d:prop>
        <c:filter>
            <c:comp-filter name="VCALENDAR">
                <c:comp-filter name="VTODO" />
            </c:comp-filter>
        </c:filter>
    </c:calendar-query>
"#;


/// A CalDAV calendar, reached over HTTP
pub struct Client {
    resource: Resource,
    http: reqwest::Client,
    /// Where the known entries live, by UID. Entries written by other clients are not always named after their UID
    hrefs: Mutex<HashMap<String, String>>,
}

impl Client {
    /// Create a client. This does not start a connection
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            resource: Resource::from(config),
            http: reqwest::Client::new(),
            hrefs: Mutex::new(HashMap::new()),
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    fn remember_href(&self, uid: &str, href: &str) {
        let mut hrefs = self.hrefs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        hrefs.insert(uid.to_string(), href.to_string());
    }

    /// The href of an entry: the one the server reported, or the one this client would have given it
    fn href_of(&self, uid: &str) -> String {
        let hrefs = self.hrefs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match hrefs.get(uid) {
            Some(href) => href.clone(),
            None => self.resource.href_for_uid(uid),
        }
    }

    async fn put(&self, href: &str, precondition: (&str, &str), ical_text: &str) -> Result<Response, BoxError> {
        let response = self.http
            .put(self.resource.combine(href))
            .header(precondition.0, precondition.1)
            .header(CONTENT_TYPE, "text/calendar; charset=utf-8")
            .header(CONTENT_LENGTH, ical_text.len())
            .basic_auth(self.resource.username(), Some(self.resource.password()))
            .body(ical_text.to_string())
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response)
    }

    async fn get(&self, href: &str) -> Result<Option<Response>, BoxError> {
        let response = self.http
            .get(self.resource.combine(href))
            .basic_auth(self.resource.username(), Some(self.resource.password()))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(response).map(Some)
    }

    /// Read the version tag of a response, or ask the server for it when the response did not carry any
    async fn version_tag_of(&self, response: &Response, href: &str) -> Result<VersionTag, BoxError> {
        if let Some(tag) = etag_header(response)? {
            return Ok(tag);
        }

        log::debug!("No ETag in the reply for {}, fetching it", href);
        let fetched = self.get(href).await?
            .ok_or_else(|| SyncError::Transport(format!("{} does not exist right after being written", href)))?;
        etag_header(&fetched)?
            .ok_or_else(|| SyncError::Transport(format!("The server provides no ETag for {}", href)).into())
    }
}

#[async_trait]
impl CalDavTransport for Client {
    async fn fetch_all_entries(&self) -> Result<HashMap<String, RemoteEntry>, BoxError> {
        let method = Method::from_bytes(b"REPORT")
            .map_err(|err| SyncError::Transport(err.to_string()))?;

        let response = self.http
            .request(method, self.resource.url().clone())
            .header("Depth", 1)
            .header(CONTENT_TYPE, "application/xml")
            .basic_auth(self.resource.username(), Some(self.resource.password()))
            .body(TASKS_BODY)
            .send()
            .await
            .map_err(transport_error)?;
        let text = check_status(response)?.text().await.map_err(transport_error)?;

        let root: Element = text.parse()
            .map_err(|err| SyncError::Transport(format!("Invalid REPORT response: {}", err)))?;
        let entries = parse_multistatus(&root);
        for entry in entries.values() {
            self.remember_href(&entry.uid, &entry.href);
        }
        Ok(entries)
    }

    async fn create_entry(&self, uid: &str, raw_text: &str) -> Result<CreatedEntry, BoxError> {
        let href = self.resource.href_for_uid(uid);
        let response = self.put(&href, ("If-None-Match", "*"), raw_text).await?;
        let version_tag = self.version_tag_of(&response, &href).await?;
        self.remember_href(uid, &href);
        Ok(CreatedEntry { uid: uid.to_string(), href, version_tag })
    }

    async fn update_entry(&self, href: &str, version_tag: &VersionTag, raw_text: &str) -> Result<VersionTag, BoxError> {
        let response = self.put(href, ("If-Match", version_tag.as_str()), raw_text).await?;
        self.version_tag_of(&response, href).await
    }

    async fn fetch_entry_raw_text(&self, uid: &str) -> Result<Option<String>, BoxError> {
        let href = self.href_of(uid);
        match self.get(&href).await? {
            None => Ok(None),
            Some(response) => {
                let text = response.text().await.map_err(transport_error)?;
                Ok(Some(text))
            },
        }
    }
}


fn transport_error(err: reqwest::Error) -> BoxError {
    SyncError::Transport(err.to_string()).into()
}

fn check_status(response: Response) -> Result<Response, BoxError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SyncError::Unauthorized(format!("the server replied {} for {}", status, response.url())).into());
    }
    if status.is_success() == false {
        return Err(SyncError::Transport(format!("Unexpected HTTP status code {:?} for {}", status, response.url())).into());
    }
    Ok(response)
}

fn etag_header(response: &Response) -> Result<Option<VersionTag>, BoxError> {
    match response.headers().get("ETag") {
        None => Ok(None),
        Some(etag) => {
            let vtag_str = etag.to_str()?;
            Ok(Some(VersionTag::from(vtag_str)))
        },
    }
}

/// Extract entries from a `multistatus` reply. Entries that cannot be understood are skipped
fn parse_multistatus(root: &Element) -> HashMap<String, RemoteEntry> {
    let mut entries = HashMap::new();
    for response in find_elems(root, "response") {
        let href = match find_elem(response, "href") {
            None => {
                log::warn!("Unable to extract HREF");
                continue;
            },
            Some(elem) => elem.text(),
        };

        let version_tag = match find_elem(response, "getetag") {
            None => {
                log::warn!("Unable to extract ETAG for item {}, ignoring it", href);
                continue;
            },
            Some(etag) => VersionTag::from(etag.text()),
        };

        let raw_text = find_elem(response, "calendar-data")
            .map(|elem| elem.text())
            .unwrap_or_default();
        let uid = match crate::utils::todo_uid(&raw_text) {
            Some(uid) => uid,
            None => {
                log::warn!("Item {} has no readable UID, ignoring it", href);
                continue;
            },
        };

        if let Some(previous) = entries.insert(uid.clone(), RemoteEntry { uid: uid.clone(), href, version_tag, raw_text }) {
            log::warn!("Several remote entries share UID {} (e.g. {}). Only one is used", uid, previous.href);
        }
    }
    entries
}
