//! Blocking FTP session abstraction
//!
//! The connector only needs three commands: machine-readable directory
//! listings (`MLSD`), `SIZE` and `RETR`. They sit behind [`TreeSession`] so
//! traversal and streaming logic can be exercised against an in-memory tree.

use crate::error::{FtpError, Result};
use chrono::NaiveDateTime;
use core_runtime::config::Credentials;
use std::io::Read;
use std::net::ToSocketAddrs;
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::FtpStream;
use tracing::debug;

const ANONYMOUS_USER: &str = "anonymous";
const ANONYMOUS_PASSWORD: &str = "anonymous@";
const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
}

/// One parsed directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Wall-clock time as sent by the server, offset not applied
    pub modified: Option<NaiveDateTime>,
    pub size: Option<u64>,
}

impl DirEntry {
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Dir,
            modified: None,
            size: None,
        }
    }

    pub fn file(name: impl Into<String>, modified: Option<NaiveDateTime>, size: Option<u64>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            modified,
            size,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Parses one `MLSD` line: `type=file;modify=20240504100000;size=12; name`.
///
/// Returns `None` for `cdir`/`pdir` entries, unknown types and malformed lines.
pub fn parse_mlsd_line(line: &str) -> Option<DirEntry> {
    let (facts, name) = line.split_once(' ')?;
    if name.is_empty() {
        return None;
    }

    let mut kind = None;
    let mut modified = None;
    let mut size = None;

    for fact in facts.split(';').filter(|f| !f.is_empty()) {
        let Some((key, value)) = fact.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "type" => {
                kind = match value.to_ascii_lowercase().as_str() {
                    "dir" => Some(EntryKind::Dir),
                    "file" => Some(EntryKind::File),
                    _ => None,
                }
            }
            "modify" => modified = parse_modify(value),
            "size" => size = value.parse().ok(),
            _ => {}
        }
    }

    Some(DirEntry {
        name: name.to_string(),
        kind: kind?,
        modified,
        size,
    })
}

/// Parses `YYYYMMDDHHMMSS[.sss]`.
pub fn parse_modify(value: &str) -> Option<NaiveDateTime> {
    let whole = value.split('.').next()?;
    NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S").ok()
}

/// A logged-in, blocking FTP session.
pub trait TreeSession: Send {
    /// Lists the entries of `path`.
    fn list_dir(&mut self, path: &str) -> Result<Vec<DirEntry>>;

    /// Size of `path` in bytes, `None` if the server cannot tell.
    fn size(&mut self, path: &str) -> Result<Option<u64>>;

    /// Streams `path`, handing each chunk to `on_chunk`; returns bytes read.
    fn retrieve(
        &mut self,
        path: &str,
        on_chunk: &mut dyn FnMut(&[u8]) -> std::io::Result<()>,
    ) -> Result<u64>;

    /// Ends the session; errors are ignored.
    fn quit(&mut self);
}

/// Opens sessions; one session per listing or download.
pub trait SessionFactory: Send + Sync {
    fn connect(&self) -> Result<Box<dyn TreeSession>>;
}

// ============================================================================
// suppaftp implementation
// ============================================================================

/// Opens plain FTP sessions with `suppaftp`.
#[derive(Clone)]
pub struct SuppaFtpFactory {
    host: String,
    port: u16,
    credentials: Credentials,
    timeout: Duration,
}

impl SuppaFtpFactory {
    pub fn new(host: impl Into<String>, port: u16, credentials: Credentials, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            credentials,
            timeout,
        }
    }
}

impl std::fmt::Debug for SuppaFtpFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuppaFtpFactory")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl SessionFactory for SuppaFtpFactory {
    fn connect(&self) -> Result<Box<dyn TreeSession>> {
        let address = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| FtpError::Connection(format!("{}: {}", self.host, e)))?
            .next()
            .ok_or_else(|| FtpError::Connection(format!("{}: no address", self.host)))?;

        let mut stream = FtpStream::connect_timeout(address, self.timeout)
            .map_err(|e| FtpError::Connection(format!("{}: {}", address, e)))?;
        stream
            .get_ref()
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| FtpError::Connection(e.to_string()))?;

        let (user, password) = if self.credentials.is_anonymous() {
            (ANONYMOUS_USER, ANONYMOUS_PASSWORD)
        } else {
            (
                self.credentials.username.as_str(),
                self.credentials.password.as_str(),
            )
        };
        stream
            .login(user, password)
            .map_err(|e| FtpError::Login(e.to_string()))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| FtpError::command("TYPE I", e))?;

        debug!(host = %self.host, port = self.port, "FTP session opened");
        Ok(Box::new(SuppaSession { stream }))
    }
}

struct SuppaSession {
    stream: FtpStream,
}

impl TreeSession for SuppaSession {
    fn list_dir(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        let lines = self
            .stream
            .mlsd(Some(path))
            .map_err(|e| FtpError::command(path, e))?;
        Ok(lines.iter().filter_map(|line| parse_mlsd_line(line)).collect())
    }

    fn size(&mut self, path: &str) -> Result<Option<u64>> {
        match self.stream.size(path) {
            Ok(size) => Ok(Some(size as u64)),
            Err(e) => {
                debug!(path, error = %e, "SIZE not available");
                Ok(None)
            }
        }
    }

    fn retrieve(
        &mut self,
        path: &str,
        on_chunk: &mut dyn FnMut(&[u8]) -> std::io::Result<()>,
    ) -> Result<u64> {
        let mut data = self
            .stream
            .retr_as_stream(path)
            .map_err(|e| FtpError::command(path, e))?;

        let mut buffer = vec![0u8; READ_CHUNK];
        let mut total = 0u64;
        loop {
            let read = data
                .read(&mut buffer)
                .map_err(|e| FtpError::command(path, format!("download interrupted: {}", e)))?;
            if read == 0 {
                break;
            }
            on_chunk(&buffer[..read]).map_err(|e| FtpError::command(path, e))?;
            total += read as u64;
        }

        self.stream
            .finalize_retr_stream(data)
            .map_err(|e| FtpError::command(path, e))?;
        Ok(total)
    }

    fn quit(&mut self) {
        let _ = self.stream.quit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_mlsd_file() {
        let entry = parse_mlsd_line("type=file;size=2048;modify=20240504100000; team a.zip").unwrap();
        assert_eq!(entry.name, "team a.zip");
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.size, Some(2048));
        assert_eq!(
            entry.modified,
            NaiveDate::from_ymd_opt(2024, 5, 4).and_then(|d| d.and_hms_opt(10, 0, 0))
        );
    }

    #[test]
    fn test_parse_mlsd_dir_and_specials() {
        let entry = parse_mlsd_line("Type=dir;Modify=20240101000000.123;UNIX.mode=0755; league").unwrap();
        assert!(entry.is_dir());
        assert!(entry.modified.is_some());

        assert!(parse_mlsd_line("type=cdir;modify=20240101000000; .").is_none());
        assert!(parse_mlsd_line("type=pdir;modify=20240101000000; ..").is_none());
        assert!(parse_mlsd_line("garbage").is_none());
    }

    #[test]
    fn test_parse_modify_rejects_bad_values() {
        assert!(parse_modify("2024").is_none());
        assert!(parse_modify("20241350100000").is_none());
    }
}
