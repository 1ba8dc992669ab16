use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use uuid::Uuid;

use super::Decision;
use crate::scoring::list_images;

/// Result of asking the scraper for the next profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileDownload {
    /// Images were saved under `destination/<id>/`.
    Profile(String),
    /// No usable images; the caller skips this profile.
    Invalid,
}

/// Scraper and swipe-action seam of a live dating-app session.
///
/// `download_profile_images` must report `Invalid` rather than fail when a
/// profile has no photos. `like`/`dislike` are fire-and-forget and silently
/// do nothing once the session is gone.
pub trait SwipeSession {
    fn download_profile_images(&mut self, destination: &Path) -> io::Result<ProfileDownload>;

    fn like(&mut self);

    fn dislike(&mut self);

    /// Liveness check, made once per cycle.
    fn is_alive(&self) -> bool;

    fn swipe(&mut self, decision: Decision) {
        match decision {
            Decision::Like => self.like(),
            Decision::Dislike => self.dislike(),
        }
    }
}

/// Offline session replaying pre-scraped profile folders from an inbox.
///
/// Each download moves the next inbox folder (in name order) into the
/// destination under a fresh UUID. Decisions are appended to
/// `decisions.log` in the inbox as `<uuid>,<source folder>,<like|dislike>`.
pub struct DirectorySession {
    inbox: PathBuf,
    current: Option<(String, String)>,
}

impl DirectorySession {
    pub fn new(inbox: impl Into<PathBuf>) -> io::Result<Self> {
        let inbox = inbox.into();
        if !inbox.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("inbox {:?} is not a directory", inbox),
            ));
        }
        Ok(Self { inbox, current: None })
    }

    pub fn log_path(&self) -> PathBuf {
        self.inbox.join("decisions.log")
    }

    fn pending(&self) -> Vec<PathBuf> {
        let mut folders: Vec<PathBuf> = match fs::read_dir(&self.inbox) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect(),
            Err(e) => {
                warn!("Cannot read inbox {:?}: {}", self.inbox, e);
                Vec::new()
            }
        };
        folders.sort();
        folders
    }

    fn record(&mut self, decision: &str) {
        let Some((id, source)) = self.current.take() else {
            debug!("No profile to {}", decision);
            return;
        };
        let line = format!("{},{},{}\n", id, source, decision);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = result {
            warn!("Could not record decision for {}: {}", id, e);
        }
    }
}

/// Moves a directory, falling back to copy + delete across filesystems.
fn move_dir(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        if entry.path().is_file() {
            fs::copy(entry.path(), to.join(entry.file_name()))?;
        }
    }
    fs::remove_dir_all(from)
}

impl SwipeSession for DirectorySession {
    fn download_profile_images(&mut self, destination: &Path) -> io::Result<ProfileDownload> {
        let Some(source) = self.pending().into_iter().next() else {
            return Ok(ProfileDownload::Invalid);
        };
        let source_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if list_images(&source)?.is_empty() {
            info!("No photos in {:?}, skipping", source);
            fs::remove_dir_all(&source)?;
            return Ok(ProfileDownload::Invalid);
        }

        fs::create_dir_all(destination)?;
        let id = Uuid::new_v4().to_string();
        move_dir(&source, &destination.join(&id))?;
        debug!("Loaded {:?} as profile {}", source, id);
        self.current = Some((id.clone(), source_name));
        Ok(ProfileDownload::Profile(id))
    }

    fn like(&mut self) {
        self.record("like");
    }

    fn dislike(&mut self) {
        self.record("dislike");
    }

    fn is_alive(&self) -> bool {
        !self.pending().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn inbox_with(dir: &TempDir, folders: &[(&str, &[&str])]) -> PathBuf {
        let inbox = dir.path().join("inbox");
        for (name, files) in folders {
            let folder = inbox.join(name);
            fs::create_dir_all(&folder).unwrap();
            for file in *files {
                fs::write(folder.join(file), b"img").unwrap();
            }
        }
        fs::create_dir_all(&inbox).unwrap();
        inbox
    }

    #[test]
    fn test_replays_folders_in_order() {
        let dir = TempDir::new().unwrap();
        let inbox = inbox_with(&dir, &[("b", &["1.jpg"][..]), ("a", &["0.png", "1.png"][..])]);
        let dest = dir.path().join("PREDICTION");
        let mut session = DirectorySession::new(&inbox).unwrap();

        assert!(session.is_alive());
        let ProfileDownload::Profile(id) = session.download_profile_images(&dest).unwrap() else {
            panic!("expected a profile");
        };
        assert_eq!(list_images(&dest.join(&id)).unwrap().len(), 2);
        session.like();

        assert!(matches!(
            session.download_profile_images(&dest).unwrap(),
            ProfileDownload::Profile(_)
        ));
        session.dislike();
        assert!(!session.is_alive());

        let log = fs::read_to_string(session.log_path()).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(&id));
        assert!(lines[0].ends_with(",a,like"));
        assert!(lines[1].ends_with(",b,dislike"));
    }

    #[test]
    fn test_folder_without_images_is_invalid() {
        let dir = TempDir::new().unwrap();
        let inbox = inbox_with(&dir, &[("empty", &["notes.txt"][..])]);
        let mut session = DirectorySession::new(&inbox).unwrap();
        assert_eq!(
            session.download_profile_images(&dir.path().join("out")).unwrap(),
            ProfileDownload::Invalid
        );
        assert!(!session.is_alive());
    }

    #[test]
    fn test_missing_inbox() {
        let dir = TempDir::new().unwrap();
        assert!(DirectorySession::new(dir.path().join("nope")).is_err());
    }
}
