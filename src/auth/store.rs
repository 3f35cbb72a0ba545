//! Flat-file credential lookup
//!
//! The credential file holds one `login:hash` pair per line. Every lookup
//! reopens and rescans the file, so edits are picked up by the next request
//! without a restart.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// A login and its stored password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub login: String,
    pub password_hash: String,
}

/// Resolves a login to its stored credential.
///
/// `Ok(None)` means the store was read completely and holds no such login.
/// An `Err` means the store itself could not be read.
pub trait CredentialStore: Send + Sync {
    fn lookup(&self, login: &str) -> io::Result<Option<Credential>>;
}

/// htpasswd-style credential file.
pub struct HtpasswdFile {
    path: PathBuf,
    span: tracing::Span,
}

impl HtpasswdFile {
    pub fn new(path: impl Into<PathBuf>, span: tracing::Span) -> Self {
        Self {
            path: path.into(),
            span,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for HtpasswdFile {
    fn lookup(&self, login: &str) -> io::Result<Option<Credential>> {
        let _enter = self.span.enter();

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        for line in reader.split(b'\n') {
            let line = line?;
            let line = line.strip_suffix(b"\r").unwrap_or(&line);

            // Anything other than exactly `login:hash` is ignored.
            let mut fields = line.split(|&b| b == b':');
            let (Some(name), Some(hash), None) = (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };

            if name != login.as_bytes() {
                continue;
            }
            let Ok(hash) = std::str::from_utf8(hash) else {
                tracing::debug!("skipping credential line with a non-UTF-8 hash");
                continue;
            };

            return Ok(Some(Credential {
                login: login.to_string(),
                password_hash: hash.to_string(),
            }));
        }

        tracing::debug!(path = %self.path.display(), "login not present in credential file");
        Ok(None)
    }
}
