//! DirectorySink - writes artifacts to disk with folder structure
//!
//! Layout: `<root>/<destination>/<YYYY-MM-DD>/<item>/<lang>.md`, one file
//! for the primary language plus one per translation. Each item is written
//! into a hidden staging directory and renamed into place, so the
//! delivered count (visible item directories under today's date) never
//! includes half-written artifacts. A final publish touches
//! `<root>/<destination>/DEPLOY`.
//!
//! Item ids that are not already safe path segments get a short digest
//! suffix, and every item directory records its raw id in `.item-id`, so two
//! distinct items never share one directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument};

use contracts::{Artifact, ContractError, DestinationId, PublishSink};

pub const DEPLOY_MARKER: &str = "DEPLOY";
const ITEM_ID_FILE: &str = ".item-id";

/// Sink that writes artifacts to a directory tree
pub struct DirectorySink {
    name: String,
    root: PathBuf,
    /// Pinned date; today (UTC) when unset
    date: Option<NaiveDate>,
}

impl DirectorySink {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            name: name.into(),
            root,
            date: None,
        })
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn date_string(&self) -> String {
        self.date
            .unwrap_or_else(|| Utc::now().date_naive())
            .format("%Y-%m-%d")
            .to_string()
    }

    pub fn day_dir(&self, destination: &DestinationId) -> PathBuf {
        self.root
            .join(path_component(destination))
            .join(self.date_string())
    }

    fn count_items(&self, destination: &DestinationId) -> io::Result<u32> {
        let dir = self.day_dir(destination);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut count = 0;
        for entry in entries {
            let entry = entry?;
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !hidden && entry.file_type()?.is_dir() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn write_artifact(
        &self,
        artifact: &Artifact,
        destination: &DestinationId,
        is_final: bool,
    ) -> io::Result<PathBuf> {
        let day_dir = self.day_dir(destination);
        let item = item_dir_name(&artifact.item_id);
        let staging = day_dir.join(format!(".{item}.tmp"));
        let target = day_dir.join(&item);

        if target.exists() {
            let owner = fs::read_to_string(target.join(ITEM_ID_FILE)).unwrap_or_default();
            if owner != artifact.item_id.as_str() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already holds item {owner:?}", target.display()),
                ));
            }
        }

        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let date = self.date_string();
        write_markdown(
            &staging,
            &artifact.primary_language,
            &artifact.title,
            &date,
            &artifact.content,
        )?;
        for (lang, text) in &artifact.translations {
            write_markdown(&staging, lang, &artifact.title, &date, text)?;
        }
        fs::write(staging.join(ITEM_ID_FILE), artifact.item_id.as_str())?;

        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(&staging, &target)?;

        if is_final {
            let marker = self.root.join(path_component(destination)).join(DEPLOY_MARKER);
            fs::write(&marker, format!("{}\n", Utc::now().to_rfc3339()))?;
            info!(sink = %self.name, destination = %destination, "Deploy marker written");
        }

        Ok(target)
    }
}

fn write_markdown(dir: &Path, lang: &str, title: &str, date: &str, body: &str) -> io::Result<()> {
    let path = dir.join(format!("{}.md", path_component(lang)));
    let escaped = title.replace('"', "\\\"");
    let doc = format!("---\ntitle: \"{escaped}\"\ndate: {date}\nlang: {lang}\n---\n\n{body}\n");
    fs::write(path, doc)
}

/// Restrict an id to a safe single path segment
fn path_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_start_matches('.') {
        "" => "_".to_string(),
        rest => rest.to_string(),
    }
}

/// Directory name for one item; ids changed by sanitising get a digest suffix
fn item_dir_name(raw: &str) -> String {
    let cleaned = path_component(raw);
    if cleaned == raw {
        return cleaned;
    }
    let digest = hex::encode(Sha256::digest(raw.as_bytes()));
    format!("{cleaned}-{}", &digest[..10])
}

impl PublishSink for DirectorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query_delivered_count(
        &self,
        destination: &DestinationId,
    ) -> Result<u32, ContractError> {
        self.count_items(destination).map_err(|e| {
            ContractError::delivered_query(&self.name, destination.as_str(), e.to_string())
        })
    }

    #[instrument(
        name = "directory_sink_publish",
        skip(self, artifact),
        fields(sink = %self.name, item = %artifact.item_id, destination = %destination)
    )]
    async fn publish(
        &mut self,
        artifact: &Artifact,
        destination: &DestinationId,
        is_final: bool,
    ) -> Result<(), ContractError> {
        match self.write_artifact(artifact, destination, is_final) {
            Ok(path) => {
                debug!(path = %path.display(), "Artifact written");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Write failed");
                Err(ContractError::publish(
                    &self.name,
                    artifact.item_id.as_str(),
                    e.to_string(),
                ))
            }
        }
    }
}
