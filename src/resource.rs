use url::Url;

use crate::config::ServerConfig;

/// A calendar collection URL, and the credentials to access it
#[derive(Clone, Debug)]
pub struct Resource {
    url: Url,
    username: String,
    password: String,
}

impl Resource {
    pub fn new(url: Url, username: String, password: String) -> Self {
        Self { url, username, password }
    }

    pub fn url(&self) -> &Url { &self.url }
    pub fn username(&self) -> &String { &self.username }
    pub fn password(&self) -> &String { &self.password }

    /// Build the URL of an entry, from the `href` the server gave for it (which usually is a path)
    pub fn combine(&self, href: &str) -> Url {
        match Url::parse(href) {
            Ok(absolute) => absolute,
            Err(_) => {
                let mut built = self.url.clone();
                built.set_path(href);
                built
            },
        }
    }

    /// The href where a new entry with the given UID is created
    pub fn href_for_uid(&self, uid: &str) -> String {
        let path = self.url.path();
        if path.ends_with('/') {
            format!("{}{}.ics", path, uid)
        } else {
            format!("{}/{}.ics", path, uid)
        }
    }
}

impl From<&ServerConfig> for Resource {
    fn from(config: &ServerConfig) -> Self {
        Self::new(config.calendar_url.clone(), config.username.clone(), config.password.clone())
    }
}
