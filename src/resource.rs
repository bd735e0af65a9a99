//! Resolution of resource identifiers into readable bytes.
//!
//! An identifier is classified into one of a fixed set of forms, checked in this
//! order: bitprint hash URN (recognized, unsupported), `file:` URI, any other
//! `<scheme>:<rest>` URI, and finally a bare filesystem path. Files and bare paths
//! get canonicalized to an absolute `file:` URI; the canonical URI is then turned
//! into a [`Resource`] that can be opened for reading.

use crate::env::EnvMap;
use crate::error::{Error, Result};
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use regex::Regex;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static BITPRINT_URN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^urn:bitprint:([A-Z2-7]{32})\.([A-Z2-7]{39})$").expect("valid regex")
});
static FILE_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^file:(.*)$").expect("valid regex"));
// At least two characters so that `C:/foo` stays a Windows path.
static GENERIC_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^([a-z][a-z0-9+.-]+):(.*)$").expect("valid regex"));
static DATA_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^data:([^,]*?)(;base64)?,(.*)$").expect("valid regex"));
static ENV_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^x-jcr36-env:(.*)$").expect("valid regex"));
static ABSOLUTE_PATH_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^x-jcr36-absolute-path:(.*)$").expect("valid regex"));

// Accepts payloads with or without trailing `=` padding.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// How an identifier string was classified, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier<'a> {
    BitprintUrn { sha1: &'a str, tiger: &'a str },
    /// A `file:` URI; holds the still percent-encoded remainder.
    FileUri(&'a str),
    /// Any other URI, passed through untouched.
    Uri { scheme: &'a str, rest: &'a str },
    BarePath(&'a str),
}

impl<'a> Identifier<'a> {
    pub fn parse(id: &'a str) -> Self {
        Self::parse_bitprint(id)
            .or_else(|| Self::parse_file_uri(id))
            .or_else(|| Self::parse_generic_uri(id))
            .unwrap_or(Identifier::BarePath(id))
    }

    fn parse_bitprint(id: &'a str) -> Option<Self> {
        let caps = BITPRINT_URN.captures(id)?;
        Some(Identifier::BitprintUrn {
            sha1: caps.get(1)?.as_str(),
            tiger: caps.get(2)?.as_str(),
        })
    }

    fn parse_file_uri(id: &'a str) -> Option<Self> {
        let caps = FILE_URI.captures(id)?;
        Some(Identifier::FileUri(caps.get(1)?.as_str()))
    }

    fn parse_generic_uri(id: &'a str) -> Option<Self> {
        let caps = GENERIC_URI.captures(id)?;
        Some(Identifier::Uri {
            scheme: caps.get(1)?.as_str(),
            rest: caps.get(2)?.as_str(),
        })
    }
}

/// A resolved identifier, ready to be opened.
///
/// Built on demand and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// Bytes carried by a `data:` URI.
    Inline(Vec<u8>),
    /// Value of an environment variable, empty when unset.
    EnvValue(String),
    /// A resolved path yielded as text rather than as file contents.
    PathText(String),
    /// A file on disk, from a `file:` URI or a bare path.
    File(PathBuf),
    /// Anything else; fetched when opened.
    Remote(String),
}

impl Resource {
    pub fn open(self) -> Result<Box<dyn Read>> {
        match self {
            Resource::Inline(bytes) => Ok(Box::new(Cursor::new(bytes))),
            Resource::EnvValue(text) | Resource::PathText(text) => {
                Ok(Box::new(Cursor::new(text.into_bytes())))
            }
            Resource::File(path) => {
                let file = File::open(&path)
                    .map_err(|e| Error::not_found(&path.to_string_lossy(), e))?;
                Ok(Box::new(file))
            }
            Resource::Remote(uri) => {
                let bytes = fetch(&uri)?;
                Ok(Box::new(Cursor::new(bytes)))
            }
        }
    }
}

fn fetch(uri: &str) -> Result<Vec<u8>> {
    log::debug!("fetching {uri}");
    let resp = ureq::get(uri).call().map_err(|e| Error::not_found(uri, e))?;
    let mut reader = resp.into_body().into_reader();
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .map_err(|e| Error::not_found(uri, e))?;
    Ok(buf)
}

/// Turn `id` into its canonical URI: files and bare paths become absolute
/// `file:` URIs, other URIs pass through unchanged.
pub fn resolve_uri(id: &str, pwd: &Path) -> Result<String> {
    match Identifier::parse(id) {
        Identifier::BitprintUrn { .. } => Err(Error::Unsupported(id.to_string())),
        Identifier::FileUri(rest) => {
            let decoded = percent_decode(rest).map_err(|reason| Error::malformed(id, reason))?;
            let path = resolve_file_path(pwd, &String::from_utf8_lossy(&decoded), true);
            Ok(format!("file:{}", encode_path(path.as_bytes())))
        }
        Identifier::Uri { .. } => Ok(id.to_string()),
        Identifier::BarePath(path) => {
            let path = resolve_file_path(pwd, path, true);
            Ok(format!("file:{}", encode_path(path.as_bytes())))
        }
    }
}

/// Resolve `id` against `pwd` and `env`.
pub fn resolve(id: &str, pwd: &Path, env: &EnvMap) -> Result<Resource> {
    let uri = resolve_uri(id, pwd)?;
    if let Some(caps) = DATA_URI.captures(&uri) {
        let payload = caps.get(3).map_or("", |m| m.as_str());
        let data = percent_decode(payload).map_err(|reason| Error::malformed(id, reason))?;
        return if caps.get(2).is_some() {
            BASE64
                .decode(&data)
                .map(Resource::Inline)
                .map_err(|e| Error::malformed(id, e))
        } else {
            Ok(Resource::Inline(data))
        };
    }
    if let Some(caps) = ENV_URI.captures(&uri) {
        let name = caps.get(1).map_or("", |m| m.as_str());
        return Ok(Resource::EnvValue(env.get(name).unwrap_or_default().to_string()));
    }
    if let Some(caps) = ABSOLUTE_PATH_URI.captures(&uri) {
        let path = caps.get(1).map_or("", |m| m.as_str());
        return Ok(Resource::PathText(resolve_file_path(pwd, path, false)));
    }
    if let Some(caps) = FILE_URI.captures(&uri) {
        let rest = caps.get(1).map_or("", |m| m.as_str());
        let decoded = percent_decode(rest).map_err(|reason| Error::malformed(id, reason))?;
        return Ok(Resource::File(file_uri_path(&String::from_utf8_lossy(&decoded))));
    }
    Ok(Resource::Remote(uri))
}

/// Resolve and open `id` in one step.
pub fn open(id: &str, pwd: &Path, env: &EnvMap) -> Result<Box<dyn Read>> {
    resolve(id, pwd, env)?.open()
}

/// Make `path` absolute with forward slashes.
///
/// `//x` is kept as-is, `/x` is absolute, `c:x` gets its drive letter upper-cased,
/// and anything else is resolved against `pwd` once and classified again. With
/// `unc` set, absolute and drive paths get the `//` authority prefix a `file:` URI
/// needs.
pub fn resolve_file_path(pwd: &Path, path: &str, unc: bool) -> String {
    let mut path = path.replace('\\', "/");
    let mut relative_resolved = false;
    loop {
        if path.starts_with("//") {
            return path;
        }
        if path.starts_with('/') {
            return if unc { format!("//{path}") } else { path };
        }
        if let Some((drive, rest)) = split_drive(&path) {
            let win_path = format!("{}:{}", drive.to_ascii_uppercase(), rest);
            return if unc { format!("///{win_path}") } else { win_path };
        }
        if relative_resolved {
            log::warn!("could not make {path:?} absolute");
            return path;
        }
        let joined = pwd.join(&path);
        let absolute = std::path::absolute(&joined).unwrap_or(joined);
        path = absolute.to_string_lossy().replace('\\', "/");
        relative_resolved = true;
    }
}

fn split_drive(path: &str) -> Option<(char, &str)> {
    let mut chars = path.chars();
    let drive = chars.next().filter(char::is_ascii_alphabetic)?;
    let rest = chars.as_str().strip_prefix(':')?;
    Some((drive, rest))
}

/// Filesystem path named by the decoded remainder of a canonical `file:` URI.
fn file_uri_path(rest: &str) -> PathBuf {
    match rest.strip_prefix("//") {
        Some(local) if local.starts_with('/') => {
            let without_slash = &local[1..];
            if split_drive(without_slash).is_some() {
                PathBuf::from(without_slash)
            } else {
                PathBuf::from(local)
            }
        }
        _ => PathBuf::from(rest),
    }
}

/// Decode `%XX` sequences; every other byte is taken literally.
pub fn percent_decode(s: &str) -> std::result::Result<Vec<u8>, String> {
    let bytes = s.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            decoded.push(bytes[i]);
            i += 1;
            continue;
        }
        if bytes.len() < i + 3 {
            return Err(format!("truncated percent sequence at index {i}"));
        }
        let hi = hex_value(bytes[i + 1]);
        let lo = hex_value(bytes[i + 2]);
        match (hi, lo) {
            (Some(hi), Some(lo)) => decoded.push((hi << 4) | lo),
            _ => return Err(format!("invalid percent sequence at index {i}")),
        }
        i += 3;
    }
    Ok(decoded)
}

fn hex_value(digit: u8) -> Option<u8> {
    (digit as char).to_digit(16).map(|d| d as u8)
}

/// Percent-encode a path for a `file:` URI, leaving alphanumerics and `./;:,_~-` alone.
pub fn encode_path(path: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut encoded = String::with_capacity(path.len());
    for &b in path {
        if b.is_ascii_alphanumeric() || b"./;:,_~-".contains(&b) {
            encoded.push(b as char);
        } else {
            encoded.push('%');
            encoded.push(HEX[usize::from(b >> 4)] as char);
            encoded.push(HEX[usize::from(b & 0xF)] as char);
        }
    }
    encoded
}
