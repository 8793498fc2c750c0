//! Package-manager repository configuration files (`<repo id>.repo`)

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::RepoError;

/// One `[repo id]` section of a repository configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    /// Section name, also the file stem
    pub id: String,
    /// Base URL packages and metadata are fetched from
    pub baseurl: String,
    /// Check package and repository signatures
    pub gpgcheck: bool,
}

impl RepoConfig {
    pub fn new(id: impl Into<String>, baseurl: impl Into<String>, gpgcheck: bool) -> Self {
        Self {
            id: id.into(),
            baseurl: baseurl.into(),
            gpgcheck,
        }
    }

    /// `<dir>/<id>.repo`
    #[must_use]
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        config_path(dir, &self.id)
    }

    /// Render the INI section. The repository is left disabled so that it
    /// is only ever used through explicit `--enablerepo`.
    #[must_use]
    pub fn render(&self) -> String {
        let check = u8::from(self.gpgcheck);
        format!(
            "[{id}]\nname={id}\nbaseurl={url}\nenabled=0\ngpgcheck={check}\nrepo_gpgcheck={check}\n",
            id = self.id,
            url = self.baseurl,
        )
    }

    /// Write the file into `dir`, replacing any previous one
    ///
    /// # Errors
    /// Returns `RepoError::Io` if the file cannot be written
    pub fn write(&self, dir: &Path) -> Result<PathBuf, RepoError> {
        let path = self.path_in(dir);
        std::fs::create_dir_all(dir).map_err(|e| RepoError::io(dir, &e))?;
        std::fs::write(&path, self.render()).map_err(|e| RepoError::io(&path, &e))?;
        debug!(path = %path.display(), "wrote repository config");
        Ok(path)
    }
}

/// `<dir>/<id>.repo`
#[must_use]
pub fn config_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}.repo"))
}

/// Remove `<dir>/<id>.repo`; a file that is already gone is fine
///
/// # Errors
/// Returns `RepoError::Io` for any other failure
pub fn remove_config(dir: &Path, id: &str) -> Result<(), RepoError> {
    let path = config_path(dir, id);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RepoError::io(&path, &e)),
    }
}

/// A repository configuration that exists only while this guard is alive
#[derive(Debug)]
pub struct ScopedRepoConfig {
    dir: PathBuf,
    id: String,
}

impl ScopedRepoConfig {
    /// Write `config` into `dir` and remove it again on drop
    ///
    /// # Errors
    /// Returns `RepoError::Io` if the file cannot be written
    pub fn enable(config: &RepoConfig, dir: &Path) -> Result<Self, RepoError> {
        config.write(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            id: config.id.clone(),
        })
    }
}

impl Drop for ScopedRepoConfig {
    fn drop(&mut self) {
        if let Err(e) = remove_config(&self.dir, &self.id) {
            warn!(repo = %self.id, error = %e, "failed to remove repository config");
        }
    }
}
