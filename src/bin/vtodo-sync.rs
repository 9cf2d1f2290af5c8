//! Runs a single sync cycle between a folder of Markdown notes and a CalDAV calendar
//!
//! Usage:
//!   VTODO_SYNC_URL=https://example.com/dav/calendars/john/tasks/ vtodo-sync ~/notes ~/.vtodo-sync.json
//!
//! Set `RUST_LOG` to display more info about the sync.

use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use url::Url;

use vtodo_sync::client::Client;
use vtodo_sync::config::ServerConfig;
use vtodo_sync::state::StateFile;
use vtodo_sync::vault::MarkdownVault;
use vtodo_sync::Reconciler;

#[derive(Parser, Debug)]
#[command(name = "vtodo-sync", version, about = "Sync the tasks of a folder of Markdown notes with a CalDAV calendar")]
struct Args {
    /// The folder that contains the notes
    vault_dir: PathBuf,

    /// Where the sync state is kept between runs
    state_file: PathBuf,

    /// URL of the calendar collection
    #[arg(long, env = "VTODO_SYNC_URL")]
    url: Url,

    #[arg(long, env = "VTODO_SYNC_USERNAME")]
    username: String,

    #[arg(long, env = "VTODO_SYNC_PASSWORD", hide_env_values = true)]
    password: String,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            calendar_url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let vault = MarkdownVault::new(&args.vault_dir);
    let state_file = StateFile::new(&args.state_file);

    let (config, mappings) = match state_file.load() {
        Ok(state) => state,
        Err(err) => {
            log::error!("Unable to load the sync state from {}: {}", args.state_file.display(), err);
            exit(1);
        },
    };
    log::info!("{} tasks have already been synced", mappings.len());

    let mut reconciler = Reconciler::new(vault, Client::new(&args.server_config()), config, mappings);
    let report = reconciler.sync().await;

    println!("{}", report);
    if report.is_success() == false {
        log::warn!("Sync did not complete, see the previous log lines for more info. You can safely start a new sync.");
        exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments() {
        let args = Args::try_parse_from(&[
            "vtodo-sync", "notes", "state.json",
            "--url", "https://example.com/dav/tasks/",
            "--username", "john",
            "--password", "secret",
        ]).unwrap();
        assert_eq!(args.vault_dir, PathBuf::from("notes"));
        assert_eq!(args.state_file, PathBuf::from("state.json"));
        assert_eq!(args.server_config().calendar_url.as_str(), "https://example.com/dav/tasks/");

        // Flags are not mistaken for paths
        assert!(Args::try_parse_from(&["vtodo-sync", "--help", "x"]).is_err());
        assert!(Args::try_parse_from(&["vtodo-sync", "notes"]).is_err());
    }
}
