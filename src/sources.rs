use std::convert::Infallible;
use std::fs;
use std::iter;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use log::debug;
use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DEVICE_SCHEME: &str = "mtp:";

/// One QIF document and the identifier it is remembered by in the import cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub identifier: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot read {identifier}: {source}")]
    Io {
        identifier: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid device file pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("device transfer failed for {identifier}: {reason}")]
    Device { identifier: String, reason: String },
}

impl SourceError {
    pub fn identifier(&self) -> &str {
        match self {
            SourceError::Io { identifier, .. } | SourceError::Device { identifier, .. } => identifier,
            SourceError::Pattern { pattern, .. } => pattern,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentifierStrategy {
    /// The file name without directories, as the file is usually re-exported under the same name.
    #[default]
    FileName,
    /// SHA-256 of the file content.
    ContentHash,
}

impl FromStr for IdentifierStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(IdentifierStrategy::FileName),
            "hash" => Ok(IdentifierStrategy::ContentHash),
            other => Err(format!("unknown identifier strategy {other:?}, expected \"name\" or \"hash\"")),
        }
    }
}

/// A local path, or `mtp:<PATTERN>` for every file on the attached device whose name matches the
/// regular expression from its start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Local(PathBuf),
    Device(String),
}

impl FromStr for SourceSpec {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.strip_prefix(DEVICE_SCHEME) {
            Some(pattern) => SourceSpec::Device(pattern.to_string()),
            None => SourceSpec::Local(PathBuf::from(s)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFile {
    pub id: String,
    pub name: String,
}

pub trait DeviceTransfer {
    fn list_files(&self) -> Result<Vec<DeviceFile>, SourceError>;
    fn fetch(&self, file: &DeviceFile) -> Result<Vec<u8>, SourceError>;
}

/// Talks to an MTP device through the `mtp-files` and `mtp-getfile` tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct MtpTools;

impl DeviceTransfer for MtpTools {
    fn list_files(&self) -> Result<Vec<DeviceFile>, SourceError> {
        let output = Command::new("mtp-files").output().map_err(|source| SourceError::Io {
            identifier: "mtp-files".to_string(),
            source,
        })?;

        // The tool prints part of its listing on stderr.
        let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
        listing.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(parse_mtp_listing(&listing))
    }

    fn fetch(&self, file: &DeviceFile) -> Result<Vec<u8>, SourceError> {
        let io_error = |source| SourceError::Io {
            identifier: file.name.clone(),
            source,
        };

        let target = tempfile::Builder::new().suffix(&file.name).tempfile().map_err(io_error)?;
        let status = Command::new("mtp-getfile")
            .arg(&file.id)
            .arg(target.path())
            .status()
            .map_err(io_error)?;
        if !status.success() {
            return Err(SourceError::Device {
                identifier: file.name.clone(),
                reason: format!("mtp-getfile exited with {status}"),
            });
        }

        fs::read(target.path()).map_err(io_error)
    }
}

/// Extracts `(File ID, Filename)` pairs from `mtp-files` output.
pub fn parse_mtp_listing(listing: &str) -> Vec<DeviceFile> {
    let mut files = Vec::new();
    let mut last_id: Option<String> = None;

    for line in listing.lines() {
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "file id" => last_id = Some(value.trim().to_string()),
            "filename" => {
                if let Some(id) = last_id.take() {
                    files.push(DeviceFile {
                        id,
                        name: value.trim().to_string(),
                    });
                }
            },
            _ => {},
        }
    }

    files
}

pub fn content_hash(bytes: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(bytes))
}

type SourceIter<'a> = Box<dyn Iterator<Item = Result<Source, SourceError>> + 'a>;

/// Turns source specifications into QIF documents, one at a time, in the order given.
pub struct SourceEnumerator<D> {
    specs: Vec<SourceSpec>,
    strategy: IdentifierStrategy,
    device: D,
}

impl<D: DeviceTransfer> SourceEnumerator<D> {
    pub fn new(specs: Vec<SourceSpec>, strategy: IdentifierStrategy, device: D) -> SourceEnumerator<D> {
        SourceEnumerator {
            specs,
            strategy,
            device,
        }
    }

    pub fn sources(&self) -> impl Iterator<Item = Result<Source, SourceError>> + '_ {
        self.specs.iter().flat_map(move |spec| self.sources_for(spec))
    }

    fn sources_for(&self, spec: &SourceSpec) -> SourceIter<'_> {
        match spec {
            SourceSpec::Local(path) => Box::new(iter::once(self.read_local(path))),
            SourceSpec::Device(pattern) => self.device_sources(pattern),
        }
    }

    fn read_local(&self, path: &Path) -> Result<Source, SourceError> {
        debug!("reading {}", path.display());
        let bytes = fs::read(path).map_err(|source| SourceError::Io {
            identifier: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(self.source(name, bytes))
    }

    fn device_sources(&self, pattern: &str) -> SourceIter<'_> {
        let regex = match Regex::new(&format!("^(?:{pattern})")) {
            Ok(regex) => regex,
            Err(source) => {
                return Box::new(iter::once(Err(SourceError::Pattern {
                    pattern: pattern.to_string(),
                    source,
                })))
            },
        };
        let files = match self.device.list_files() {
            Ok(files) => files,
            Err(err) => return Box::new(iter::once(Err(err))),
        };

        Box::new(files.into_iter().filter(move |file| regex.is_match(&file.name)).map(move |file| {
            debug!("found matching file on device: {:?} (ID: {})", file.name, file.id);
            let bytes = self.device.fetch(&file)?;
            Ok(self.source(file.name, bytes))
        }))
    }

    fn source(&self, name: String, bytes: Vec<u8>) -> Source {
        let identifier = match self.strategy {
            IdentifierStrategy::FileName => name,
            IdentifierStrategy::ContentHash => content_hash(&bytes),
        };
        Source {
            identifier,
            text: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}
