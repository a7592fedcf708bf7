//! Static file and memory cache handlers.
//!
//! [`FileHandler`] reads a file from disk on every request.
//! [`CacheHandler`] keeps the body in memory and negotiates
//! `Accept-Encoding`, compressing lazily once per encoding and serving
//! the compressed variant only when it is actually smaller.
//!
//! Both send `Last-Modified` and answer a matching `If-Modified-Since`
//! with `304 Not Modified`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use flate2::Compression;
use tracing::warn;

use switchyard_http::{mime_type_for_extension, Response, StatusCode};

use crate::context::Context;
use crate::handler::Handler;

/// Serves one file from disk, read per request.
pub struct FileHandler {
    path: PathBuf,
}

impl FileHandler {
    /// Create a handler serving `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file this handler serves.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Handler for FileHandler {
    fn handle(&self, ctx: &mut Context) -> bool {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "file read failed");
                ctx.response_mut().set_status(StatusCode::NOT_FOUND);
                return true;
            }
        };
        let modified = std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok()
            .map(http_date);

        if let Some(ref http_date) = modified {
            if not_modified_since(ctx, http_date) {
                return true;
            }
        }

        let response = ctx.response_mut();
        response.set_status(StatusCode::OK);
        response
            .headers_mut()
            .insert("content-type", content_type_for(&self.path).as_bytes().to_vec());
        if let Some(http_date) = modified {
            response
                .headers_mut()
                .insert("last-modified", http_date.into_bytes());
        }
        response.set_body(data);
        true
    }
}

/// Content encodings the cache handler can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Gzip,
    Zlib,
    Deflate,
}

impl Encoding {
    const COUNT: usize = 3;

    fn index(self) -> usize {
        match self {
            Self::Gzip => 0,
            Self::Zlib => 1,
            Self::Deflate => 2,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Zlib => "zlib",
            Self::Deflate => "deflate",
        }
    }

    fn compress(self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
        }
    }
}

/// Serves an in-memory body with lazy per-encoding compression.
#[derive(Debug)]
pub struct CacheHandler {
    content_type: String,
    http_date: Option<String>,
    data: Vec<u8>,
    compressed: [OnceLock<Vec<u8>>; Encoding::COUNT],
}

impl CacheHandler {
    /// Create a handler around an in-memory body.
    #[must_use]
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            http_date: None,
            data,
            compressed: [OnceLock::new(), OnceLock::new(), OnceLock::new()],
        }
    }

    /// Load a file into memory.
    ///
    /// # Errors
    ///
    /// Fails if `path` is a directory or cannot be read.
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if metadata.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            ));
        }
        let data = std::fs::read(path)?;
        let mut handler = Self::new(content_type_for(path), data);
        handler.http_date = metadata.modified().ok().map(http_date);
        Ok(handler)
    }

    /// Stamp the body with a modification time for revalidation.
    #[must_use]
    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.http_date = Some(http_date(modified));
        self
    }

    /// The uncompressed body.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// First encoding in the client's `Accept-Encoding` list we support.
    fn negotiate(ctx: &Context) -> Option<Encoding> {
        let accept = ctx.request().headers().get_str("accept-encoding")?;
        for part in accept.split(',') {
            let token = part.trim().split(';').next().unwrap_or("").trim();
            if token == "*" || token.eq_ignore_ascii_case("gzip") {
                return Some(Encoding::Gzip);
            }
            if token.eq_ignore_ascii_case("zlib") {
                return Some(Encoding::Zlib);
            }
            if token.eq_ignore_ascii_case("deflate") {
                return Some(Encoding::Deflate);
            }
        }
        None
    }

    /// Compressed variant of the body, computed once per encoding.
    fn encoded(&self, encoding: Encoding) -> &[u8] {
        self.compressed[encoding.index()]
            .get_or_init(|| encoding.compress(&self.data).unwrap_or_default())
    }

    fn write_body(&self, response: &mut Response, encoding: Option<Encoding>) {
        if !self.content_type.is_empty() {
            response
                .headers_mut()
                .insert("content-type", self.content_type.as_bytes().to_vec());
        }
        if let Some(ref http_date) = self.http_date {
            response
                .headers_mut()
                .insert("last-modified", http_date.as_bytes().to_vec());
        }
        if let Some(encoding) = encoding {
            let encoded = self.encoded(encoding);
            // A compressed variant only wins when it is actually smaller.
            if !encoded.is_empty() && encoded.len() < self.data.len() {
                response
                    .headers_mut()
                    .insert("content-encoding", encoding.name().as_bytes().to_vec());
                response.set_body(encoded.to_vec());
                return;
            }
        }
        response.set_body(self.data.clone());
    }
}

impl Handler for CacheHandler {
    fn handle(&self, ctx: &mut Context) -> bool {
        if let Some(ref http_date) = self.http_date {
            if not_modified_since(ctx, http_date) {
                return true;
            }
        }
        let encoding = Self::negotiate(ctx);
        let response = ctx.response_mut();
        response.set_status(StatusCode::OK);
        self.write_body(response, encoding);
        true
    }
}

/// Answer `If-Modified-Since` revalidation; true if a 304 was written.
fn not_modified_since(ctx: &mut Context, http_date: &str) -> bool {
    let matches = ctx
        .request()
        .headers()
        .get_str("if-modified-since")
        .is_some_and(|since| since == http_date);
    if matches {
        let response = ctx.response_mut();
        response.set_status(StatusCode::NOT_MODIFIED);
        response
            .headers_mut()
            .insert("last-modified", http_date.as_bytes().to_vec());
    }
    matches
}

fn content_type_for(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or("application/octet-stream", mime_type_for_extension)
}

/// Render a `SystemTime` as an RFC 7231 HTTP date, e.g.
/// `Wed, 21 Oct 2015 07:28:00 GMT`. Times before the epoch clamp to it.
fn http_date(time: SystemTime) -> String {
    let secs = time
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    let days = secs / 86_400;
    let (hour, minute, second) = (secs / 3_600 % 24, secs / 60 % 60, secs % 60);

    // Era-based civil-date conversion. Years are counted from March 1st
    // of year 0, which parks the leap day at the end of the year and
    // makes every month length follow the single (153m + 2) / 5 rule.
    let z = days + 719_468;
    let era_day = z % 146_097;
    let era_year = (era_day - era_day / 1_460 + era_day / 36_524 - era_day / 146_096) / 365;
    let year_day = era_day - (365 * era_year + era_year / 4 - era_year / 100);
    let shifted_month = (5 * year_day + 2) / 153;
    let day = year_day - (153 * shifted_month + 2) / 5 + 1;
    let month = if shifted_month < 10 {
        shifted_month + 3
    } else {
        shifted_month - 9
    };
    let year = era_year + z / 146_097 * 400 + u64::from(month <= 2);

    // The epoch fell on a Thursday.
    let weekday = match days % 7 {
        0 => "Thu",
        1 => "Fri",
        2 => "Sat",
        3 => "Sun",
        4 => "Mon",
        5 => "Tue",
        _ => "Wed",
    };
    let month = match month {
        1 => "Jan",
        2 => "Feb",
        3 => "Mar",
        4 => "Apr",
        5 => "May",
        6 => "Jun",
        7 => "Jul",
        8 => "Aug",
        9 => "Sep",
        10 => "Oct",
        11 => "Nov",
        _ => "Dec",
    };
    format!("{weekday}, {day:02} {month} {year} {hour:02}:{minute:02}:{second:02} GMT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::time::Duration;
    use switchyard_http::{Method, Request};

    fn context_for(request: Request) -> Context {
        let mut ctx = Context::new();
        ctx.begin(request);
        ctx
    }

    #[test]
    fn cache_handler_serves_identity_without_accept_encoding() {
        let handler = CacheHandler::new("text/plain; charset=utf-8", b"hello".to_vec());
        let mut ctx = context_for(Request::new(Method::Get, "/f"));
        assert!(handler.handle(&mut ctx));
        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert_eq!(ctx.response().body(), b"hello");
        assert_eq!(
            ctx.response().headers().get_str("content-type"),
            Some("text/plain; charset=utf-8")
        );
        assert!(!ctx.response().headers().contains("content-encoding"));
    }

    #[test]
    fn cache_handler_compresses_large_bodies_for_gzip_clients() {
        let body = vec![b'a'; 4096];
        let handler = CacheHandler::new("text/plain", body.clone());
        let mut ctx = context_for(
            Request::new(Method::Get, "/f").header("Accept-Encoding", b"gzip".to_vec()),
        );
        assert!(handler.handle(&mut ctx));
        assert_eq!(
            ctx.response().headers().get_str("content-encoding"),
            Some("gzip")
        );
        assert!(ctx.response().body().len() < body.len());

        let mut decoder = flate2::read::GzDecoder::new(ctx.response().body());
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn cache_handler_honours_encoding_preference_order() {
        let body = vec![b'x'; 4096];
        let handler = CacheHandler::new("text/plain", body.clone());
        let mut ctx = context_for(
            Request::new(Method::Get, "/f").header("Accept-Encoding", b"deflate, gzip".to_vec()),
        );
        assert!(handler.handle(&mut ctx));
        assert_eq!(
            ctx.response().headers().get_str("content-encoding"),
            Some("deflate")
        );

        let mut decoder = flate2::read::DeflateDecoder::new(ctx.response().body());
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn cache_handler_wildcard_means_gzip() {
        let body = vec![b'z'; 4096];
        let handler = CacheHandler::new("text/plain", body);
        let mut ctx = context_for(
            Request::new(Method::Get, "/f").header("Accept-Encoding", b"*".to_vec()),
        );
        assert!(handler.handle(&mut ctx));
        assert_eq!(
            ctx.response().headers().get_str("content-encoding"),
            Some("gzip")
        );
    }

    #[test]
    fn cache_handler_keeps_identity_when_compression_grows_body() {
        // Tiny bodies gain nothing from a gzip wrapper.
        let handler = CacheHandler::new("text/plain", b"hi".to_vec());
        let mut ctx = context_for(
            Request::new(Method::Get, "/f").header("Accept-Encoding", b"gzip".to_vec()),
        );
        assert!(handler.handle(&mut ctx));
        assert!(!ctx.response().headers().contains("content-encoding"));
        assert_eq!(ctx.response().body(), b"hi");
    }

    #[test]
    fn cache_handler_revalidates_with_if_modified_since() {
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let handler = CacheHandler::new("text/plain", b"cached".to_vec()).with_modified(modified);
        let validator = http_date(modified);

        let mut ctx = context_for(
            Request::new(Method::Get, "/f")
                .header("If-Modified-Since", validator.clone().into_bytes()),
        );
        assert!(handler.handle(&mut ctx));
        assert_eq!(ctx.response().status(), StatusCode::NOT_MODIFIED);
        assert!(ctx.response().body().is_empty());

        // A stale validator gets the full body.
        let mut ctx = context_for(
            Request::new(Method::Get, "/f")
                .header("If-Modified-Since", b"Thu, 01 Jan 1970 00:00:00 GMT".to_vec()),
        );
        assert!(handler.handle(&mut ctx));
        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert_eq!(ctx.response().body(), b"cached");
        assert_eq!(
            ctx.response().headers().get_str("last-modified"),
            Some(validator.as_str())
        );
    }

    #[test]
    fn file_handler_serves_disk_contents() {
        let dir = std::env::temp_dir().join(format!("switchyard-files-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("page.html");
        std::fs::write(&file, b"<html></html>").unwrap();

        let handler = FileHandler::new(&file);
        let mut ctx = context_for(Request::new(Method::Get, "/page.html"));
        assert!(handler.handle(&mut ctx));
        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert_eq!(ctx.response().body(), b"<html></html>");
        assert_eq!(
            ctx.response().headers().get_str("content-type"),
            Some("text/html; charset=utf-8")
        );
        assert!(ctx.response().headers().contains("last-modified"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn file_handler_missing_file_is_not_found() {
        let handler = FileHandler::new("/definitely/not/here.txt");
        let mut ctx = context_for(Request::new(Method::Get, "/f"));
        assert!(handler.handle(&mut ctx));
        assert_eq!(ctx.response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn from_file_rejects_directories() {
        let err = CacheHandler::from_file(std::env::temp_dir()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[test]
    fn http_date_formats_known_instants() {
        assert_eq!(
            http_date(SystemTime::UNIX_EPOCH),
            "Thu, 01 Jan 1970 00:00:00 GMT"
        );
        // 2015-10-21 07:28:00 UTC, the RFC 7231 example date.
        let instant = SystemTime::UNIX_EPOCH + Duration::from_secs(1_445_412_480);
        assert_eq!(http_date(instant), "Wed, 21 Oct 2015 07:28:00 GMT");
    }

    #[test]
    fn http_date_handles_leap_days() {
        // 2000-02-29, a leap day in a century year.
        let instant = SystemTime::UNIX_EPOCH + Duration::from_secs(11_016 * 86_400);
        assert_eq!(http_date(instant), "Tue, 29 Feb 2000 00:00:00 GMT");

        // The day after rolls over into March.
        let instant = SystemTime::UNIX_EPOCH + Duration::from_secs(11_017 * 86_400);
        assert_eq!(http_date(instant), "Wed, 01 Mar 2000 00:00:00 GMT");
    }
}
