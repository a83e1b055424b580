//! Fetching repository content.
//!
//! Fetchers put what they download into the `downloads` namespace of the
//! object store and report problems as fetch error checks. The validation
//! walk only ever reads objects from the store.

use std::{fs, io, mem, thread};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use bytes::Bytes;
use log::{debug, warn};
use rpki::{rrdp, uri};
use serde::Deserialize;
use crate::commons::storage::{DownloadedObject, ObjectStore, StoreError};
use super::checks::ValidationCheck;


//------------ FetchMode -----------------------------------------------------

/// How repository content is obtained.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Mirror repositories with an external rsync command.
    Rsync,

    /// Only use what is already in the object store.
    Offline,
}


//------------ RepoFetcher ---------------------------------------------------

/// Obtains repository content for a validation run.
pub trait RepoFetcher: Send + Sync {
    /// Makes sure the store has the current version of a single object.
    fn visit_object(&self, uri: &uri::Rsync) -> Vec<ValidationCheck>;

    /// Makes sure the store has the current content of a whole repository
    /// directory.
    fn visit_repo(&self, uri: &uri::Rsync) -> Vec<ValidationCheck>;

    /// Cleans up at the end of a validation run.
    fn finish(&self) { }
}


//------------ OfflineFetcher ------------------------------------------------

/// A fetcher that never goes out to the network.
#[derive(Clone, Debug)]
pub struct OfflineFetcher {
    store: Arc<ObjectStore>,
}

impl OfflineFetcher {
    pub fn new(store: Arc<ObjectStore>) -> Self {
        OfflineFetcher { store }
    }
}

impl RepoFetcher for OfflineFetcher {
    fn visit_object(&self, uri: &uri::Rsync) -> Vec<ValidationCheck> {
        match self.store.get_download(uri) {
            Ok(Some(_)) => Vec::new(),
            Ok(None) => vec![ValidationCheck::fetch_error(format!(
                "{uri} is not available in offline mode"
            ))],
            Err(err) => vec![ValidationCheck::fetch_error(format!(
                "cannot read {uri} from the store: {err}"
            ))],
        }
    }

    fn visit_repo(&self, _uri: &uri::Rsync) -> Vec<ValidationCheck> {
        Vec::new()
    }
}


//------------ RsyncSettings -------------------------------------------------

/// How to run the external rsync command.
#[derive(Clone, Debug)]
pub struct RsyncSettings {
    pub command: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub cache_dir: PathBuf,
}


//------------ RsyncFetcher --------------------------------------------------

/// A fetcher that mirrors repositories with rsync.
///
/// Content is mirrored into `<cache_dir>/<host>/<module>/<path>` and then
/// loaded into the store. A fetcher is meant to be used for a single
/// validation run: repositories synced during the run are not synced again
/// for objects below them until [`RepoFetcher::finish`] is called.
///
/// When a run finishes, downloads below a directory that was mirrored
/// completely but that are no longer in the mirror are removed from the
/// store.
#[derive(Debug)]
pub struct RsyncFetcher {
    store: Arc<ObjectStore>,
    settings: RsyncSettings,

    /// The directory URIs synced during the current run.
    synced: Mutex<HashSet<String>>,

    /// The state of completely mirrored directories.
    mirrored: Mutex<Mirrored>,
}

/// Directories rsync and loading both succeeded for, and what they held.
#[derive(Debug, Default)]
struct Mirrored {
    bases: Vec<String>,
    files: HashSet<String>,
}

impl RsyncFetcher {
    pub fn new(store: Arc<ObjectStore>, settings: RsyncSettings) -> Self {
        RsyncFetcher {
            store,
            settings,
            synced: Mutex::new(HashSet::new()),
            mirrored: Mutex::new(Mirrored::default()),
        }
    }

    fn is_synced(&self, uri: &str) -> bool {
        self.synced.lock().expect("poisoned lock").iter().any(|base| {
            uri.starts_with(base.as_str())
        })
    }

    fn mark_synced(&self, uri: String) {
        self.synced.lock().expect("poisoned lock").insert(uri);
    }

    /// Runs rsync, killing it if it takes too long.
    fn run_rsync(&self, source: &str, target: &Path) -> Result<(), String> {
        debug!("rsync {} -> {}", source, target.display());
        let mut child = Command::new(&self.settings.command)
            .args(&self.settings.args)
            .arg(source)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                format!("cannot run '{}': {}", self.settings.command, err)
            })?;

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    return Err(format!("rsync {source} failed: {status}"))
                }
                Ok(None) => {
                    if started.elapsed() > self.settings.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(format!(
                            "rsync {} timed out after {} seconds",
                            source, self.settings.timeout.as_secs()
                        ))
                    }
                    thread::sleep(Duration::from_millis(100));
                }
                Err(err) => return Err(format!("rsync {source} failed: {err}"))
            }
        }
    }

    /// Loads a mirrored file into the store if its content changed.
    fn load_file(&self, uri: uri::Rsync, path: &Path) -> Result<(), String> {
        let content = fs::read(path).map_err(|err| {
            format!("cannot read '{}': {}", path.display(), err)
        })?;
        let known = self.store.get_download(&uri).map_err(|e| e.to_string())?;
        if known.map(|known| known.hash) == Some(rrdp::Hash::from_data(&content)) {
            return Ok(())
        }
        self.store.put_download(
            &DownloadedObject::new(uri, Bytes::from(content))
        ).map_err(|e| e.to_string())
    }

    /// Loads all mirrored files below a directory into the store.
    ///
    /// Returns the URIs of all the files found.
    fn load_dir(
        &self, base: &uri::Rsync, dir: &Path
    ) -> Result<Vec<String>, String> {
        let mut res = Vec::new();
        let mut todo = vec![(base.clone(), dir.to_path_buf())];
        while let Some((base, dir)) = todo.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(format!(
                        "cannot read '{}': {}", dir.display(), err
                    ))
                }
            };
            for entry in entries {
                let entry = entry.map_err(|err| {
                    format!("cannot read '{}': {}", dir.display(), err)
                })?;
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue
                };
                let path = entry.path();
                if path.is_dir() {
                    let sub = base.join(format!("{name}/").as_bytes())
                        .map_err(|err| err.to_string())?;
                    todo.push((sub, path));
                }
                else {
                    let uri = base.join(name.as_bytes())
                        .map_err(|err| err.to_string())?;
                    res.push(uri.to_string());
                    self.load_file(uri, &path)?;
                }
            }
        }
        Ok(res)
    }

    /// Removes downloads that vanished from completely mirrored directories.
    fn remove_vanished(&self) -> Result<(), StoreError> {
        let mirrored = mem::take(
            &mut *self.mirrored.lock().expect("poisoned lock")
        );
        if mirrored.bases.is_empty() {
            return Ok(())
        }
        for uri in self.store.download_uris()? {
            let key = uri.to_string();
            if mirrored.files.contains(&key) {
                continue
            }
            if mirrored.bases.iter().any(|base| key.starts_with(base.as_str())) {
                debug!("Removing vanished download {key}");
                self.store.remove_download(&uri)?;
            }
        }
        Ok(())
    }
}

impl RepoFetcher for RsyncFetcher {
    fn visit_object(&self, uri: &uri::Rsync) -> Vec<ValidationCheck> {
        let source = uri.to_string();
        if self.is_synced(&source) {
            return Vec::new()
        }
        let target = local_path(&self.settings.cache_dir, &source);
        let mut res = Vec::new();
        if let Some(parent) = target.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                res.push(ValidationCheck::fetch_error(format!(
                    "cannot create '{}': {}", parent.display(), err
                )));
                return res
            }
        }
        if let Err(err) = self.run_rsync(&source, &target) {
            warn!("{}", err);
            res.push(ValidationCheck::fetch_error(err));
        }
        if target.is_file() {
            if let Err(err) = self.load_file(uri.clone(), &target) {
                res.push(ValidationCheck::fetch_error(err));
            }
        }
        res
    }

    fn visit_repo(&self, uri: &uri::Rsync) -> Vec<ValidationCheck> {
        let mut source = uri.to_string();
        if !source.ends_with('/') {
            source.push('/');
        }
        if self.is_synced(&source) {
            return Vec::new()
        }
        let base = match uri::Rsync::from_str(&source) {
            Ok(base) => base,
            Err(err) => {
                return vec![ValidationCheck::fetch_error(format!(
                    "invalid repository URI {source}: {err}"
                ))]
            }
        };
        let target = local_path(&self.settings.cache_dir, &source);
        let mut res = Vec::new();
        if let Err(err) = fs::create_dir_all(&target) {
            res.push(ValidationCheck::fetch_error(format!(
                "cannot create '{}': {}", target.display(), err
            )));
            return res
        }

        // A trailing slash makes rsync copy the content of the directory.
        let mut target_arg = target.clone().into_os_string();
        target_arg.push("/");
        let complete = match self.run_rsync(&source, Path::new(&target_arg)) {
            Ok(()) => true,
            Err(err) => {
                warn!("{}", err);
                res.push(ValidationCheck::fetch_error(err));
                false
            }
        };

        // Whatever made it into the mirror earlier is still usable.
        match self.load_dir(&base, &target) {
            Ok(files) => {
                let mut mirrored = self.mirrored.lock().expect("poisoned lock");
                mirrored.files.extend(files);
                if complete {
                    mirrored.bases.push(source.clone());
                }
            }
            Err(err) => res.push(ValidationCheck::fetch_error(err)),
        }
        self.mark_synced(source);
        res
    }

    fn finish(&self) {
        if let Err(err) = self.remove_vanished() {
            warn!("Cannot remove vanished downloads: {err}");
        }
        self.synced.lock().expect("poisoned lock").clear();
    }
}

/// Returns the local mirror path for an rsync URI.
fn local_path(cache_dir: &Path, uri: &str) -> PathBuf {
    let mut res = cache_dir.to_path_buf();
    let rest = uri.strip_prefix("rsync://").unwrap_or(uri);
    for segment in rest.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            continue
        }
        res.push(segment);
    }
    res
}


//------------ Tests --------------------------------------------------------
