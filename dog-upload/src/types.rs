use bytes::Bytes;
use futures_core::Stream;
use std::pin::Pin;
use uuid::Uuid;

use crate::{UploadError, UploadResult};

/// Stream of bytes for object content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Wrap an in-memory buffer as a single-item [`ByteStream`]
pub fn bytes_stream(bytes: Bytes) -> ByteStream {
    Box::pin(futures_util::stream::once(async move { Ok(bytes) }))
}

/// Random token that scopes one upload session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a new random token (128 bits from a v4 UUID)
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity handed to the client; see [`crate::IdentityCodec`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedIdentity(String);

impl EncodedIdentity {
    /// Create from existing string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for EncodedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage-relative location of one session's target object.
///
/// Layout: `<root>/<token>/<token>[-<base>][.<ext>]`. The file name starts
/// with the token so it is unique on its own, and the per-session parent
/// directory can be removed without touching other sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionPath(String);

impl SessionPath {
    /// Derive the path for a fresh session
    pub fn derive(root: &str, token: &SessionToken, filename: Option<&str>) -> Self {
        let mut name = token.as_str().to_string();

        if let Some((base, ext)) = filename.and_then(split_client_filename) {
            if !base.is_empty() {
                name.push('-');
                name.push_str(&base);
            }
            if let Some(ext) = ext {
                name.push('.');
                name.push_str(&ext);
            }
        }

        Self(join(&[root, token.as_str(), &name]))
    }

    /// Wrap a path recovered from an authenticated identity
    pub fn from_trusted(path: String) -> Self {
        Self(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path component; the session id used to key fragment namespaces
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Directory holding the target object
    pub fn parent(&self) -> &str {
        self.0.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
    }
}

impl std::fmt::Display for SessionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Join namespace segments with `/`, skipping empty segments
pub(crate) fn join(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Reduce a client filename to a safe `(base, extension)` pair.
///
/// Directory components are dropped and characters outside
/// `[A-Za-z0-9_-]` are replaced, so the result can never escape its
/// namespace.
fn split_client_filename(raw: &str) -> Option<(String, Option<String>)> {
    let file = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    if file.is_empty() || file == "." || file == ".." {
        return None;
    }

    let (base, ext) = match file.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() && !ext.is_empty() => (base, Some(ext)),
        _ => (file, None),
    };

    let base = sanitize_segment(base);
    let ext = ext.map(sanitize_segment).filter(|e| !e.is_empty());
    Some((base, ext))
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Byte-range bookkeeping carried out of band with every fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRange {
    /// Position of the fragment's first byte in the final file
    pub offset: u64,
    /// Final size of the whole file; constant across a session
    pub declared_length: u64,
}

impl FragmentRange {
    pub fn new(offset: u64, declared_length: u64) -> Self {
        Self {
            offset,
            declared_length,
        }
    }

    /// Parse the `Upload-Offset` / `Upload-Length` pair.
    ///
    /// Both must be present and non-negative integers.
    pub fn parse(offset: Option<&str>, declared_length: Option<&str>) -> UploadResult<Self> {
        let offset = parse_field("offset", offset)?;
        let declared_length = parse_field("length", declared_length)?;
        Ok(Self::new(offset, declared_length))
    }
}

fn parse_field(name: &str, value: Option<&str>) -> UploadResult<u64> {
    let value = value.ok_or_else(|| UploadError::invalid_range(format!("missing {}", name)))?;
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| UploadError::invalid_range(format!("{} must be a non-negative integer", name)))
}

/// Outcome of a native append attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Every block of the fragment was appended
    Done,
    /// The append strategy cannot take this fragment; re-ingest it via merge
    FallbackRequired,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> SessionToken {
        SessionToken("abc123".to_string())
    }

    #[test]
    fn derives_path_with_filename() {
        let path = SessionPath::derive("filepond", &token(), Some("report.pdf"));
        assert_eq!(path.as_str(), "filepond/abc123/abc123-report.pdf");
        assert_eq!(path.file_name(), "abc123-report.pdf");
        assert_eq!(path.parent(), "filepond/abc123");
    }

    #[test]
    fn derives_path_without_filename() {
        let path = SessionPath::derive("filepond", &token(), None);
        assert_eq!(path.as_str(), "filepond/abc123/abc123");
    }

    #[test]
    fn strips_directory_components() {
        let path = SessionPath::derive("filepond", &token(), Some("../../etc/passwd"));
        assert_eq!(path.as_str(), "filepond/abc123/abc123-passwd");

        let path = SessionPath::derive("filepond", &token(), Some("C:\\Users\\me\\a b.tar.gz"));
        assert_eq!(path.as_str(), "filepond/abc123/abc123-a_b_tar.gz");
    }

    #[test]
    fn dotfiles_keep_their_name() {
        let path = SessionPath::derive("filepond", &token(), Some(".env"));
        assert_eq!(path.as_str(), "filepond/abc123/abc123-_env");
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(SessionToken::new(), SessionToken::new());
        assert_eq!(SessionToken::new().as_str().len(), 32);
    }

    #[test]
    fn parses_ranges() {
        assert_eq!(
            FragmentRange::parse(Some("5242880"), Some(" 10485760 ")).unwrap(),
            FragmentRange::new(5_242_880, 10_485_760)
        );
        assert!(FragmentRange::parse(None, Some("1")).is_err());
        assert!(FragmentRange::parse(Some("-1"), Some("1")).is_err());
        assert!(FragmentRange::parse(Some("0"), Some("ten")).is_err());
    }
}
