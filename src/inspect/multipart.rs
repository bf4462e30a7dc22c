//! Multipart/form-data body decomposition
//!
//! Splits a request body into parts, records every part header, and files
//! each part into the variable sink as either a form field (raw bytes,
//! no charset decoding) or a file upload (name, size, optional temp copy).
//!
//! Duplicate parameters in Content-Type and Content-Disposition resolve to
//! the last occurrence. Parsers disagree here (busboy takes the first);
//! the choice is pinned by tests, not left to an implementation detail.

use std::io::Write;
use std::path::PathBuf;

use tempfile::{Builder, NamedTempFile};
use thiserror::Error;
use tracing::warn;

use super::variables::TransactionVariables;

#[derive(Debug, Error)]
pub enum MultipartError {
    #[error("Unparseable content type")]
    MalformedContentType,

    #[error("Not a multipart body")]
    NotMultipart,

    #[error("Malformed multipart body: {0}")]
    MalformedBody(String),
}

type Result<T> = std::result::Result<T, MultipartError>;

/// Capability handle for writable temp storage.
///
/// Injected rather than queried from the environment so both branches of the
/// file-part path are testable.
#[derive(Debug, Clone)]
pub struct TempStorage {
    enabled: bool,
    dir: Option<PathBuf>,
}

impl TempStorage {
    pub fn new(enabled: bool, dir: Option<PathBuf>) -> Self {
        Self { enabled, dir }
    }

    pub fn disabled() -> Self {
        Self::new(false, None)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn create(&self) -> std::io::Result<NamedTempFile> {
        match &self.dir {
            Some(dir) => Builder::new().prefix("waf-part-").tempfile_in(dir),
            None => Builder::new().prefix("waf-part-").tempfile(),
        }
    }
}

/// Parse a header value of the form `token; key=value; key="quoted value"`.
///
/// Returns the lowercased token and the parameter list in source order.
/// Lookups take the last occurrence when a key repeats.
pub fn parse_media_type(input: &str) -> Result<(String, Vec<(String, String)>)> {
    let input = input.trim();
    let (token, mut rest) = match input.find(';') {
        Some(idx) => (&input[..idx], &input[idx + 1..]),
        None => (input, ""),
    };

    let token = token.trim().to_ascii_lowercase();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(MultipartError::MalformedContentType);
    }

    let mut params = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        let eq = rest
            .find('=')
            .ok_or(MultipartError::MalformedContentType)?;
        if let Some(semi) = rest.find(';') {
            // a bare key before the next ';' has no value
            if semi < eq {
                return Err(MultipartError::MalformedContentType);
            }
        }
        let key = rest[..eq].trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(MultipartError::MalformedContentType);
        }
        rest = &rest[eq + 1..];

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            let mut out = String::new();
            let mut close = None;
            let mut chars = quoted.char_indices();
            while let Some((i, c)) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some((_, escaped)) => out.push(escaped),
                        None => return Err(MultipartError::MalformedContentType),
                    },
                    '"' => {
                        close = Some(i);
                        break;
                    }
                    _ => out.push(c),
                }
            }
            let close = close.ok_or(MultipartError::MalformedContentType)?;
            rest = quoted[close + 1..].trim_start();
            if !rest.is_empty() {
                rest = rest
                    .strip_prefix(';')
                    .ok_or(MultipartError::MalformedContentType)?;
            }
            out
        } else {
            match rest.find(';') {
                Some(idx) => {
                    let v = rest[..idx].trim().to_string();
                    rest = &rest[idx + 1..];
                    v
                }
                None => {
                    let v = rest.trim().to_string();
                    rest = "";
                    v
                }
            }
        };

        params.push((key, value));
    }

    Ok((token, params))
}

/// Last occurrence wins on duplicate parameter keys
fn last_param<'p>(params: &'p [(String, String)], key: &str) -> Option<&'p str> {
    params
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// One part of a multipart body: parsed headers plus raw content bytes.
#[derive(Debug)]
pub struct Part<'a> {
    headers: Vec<(String, String)>,
    raw_headers: Vec<String>,
    pub data: &'a [u8],
}

impl Part<'_> {
    /// Raw `"Name: Value"` lines, in part order
    pub fn raw_headers(&self) -> &[String] {
        &self.raw_headers
    }

    fn disposition_params(&self) -> Option<Vec<(String, String)>> {
        let value = self
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-disposition"))
            .map(|(_, v)| v.as_str())?;
        parse_media_type(value).ok().map(|(_, params)| params)
    }

    /// Form field name from the Content-Disposition `name` parameter
    pub fn field_name(&self) -> String {
        self.disposition_params()
            .and_then(|params| last_param(&params, "name").map(str::to_string))
            .unwrap_or_default()
    }

    /// Filename from Content-Disposition; absent or empty means this part is
    /// a regular field, never a file, whatever its content type claims.
    pub fn filename(&self) -> Option<String> {
        self.disposition_params()
            .and_then(|params| last_param(&params, "filename").map(str::to_string))
            .filter(|f| !f.is_empty())
    }
}

/// Lazy iterator over the parts of a multipart body.
///
/// Parts are produced strictly in body order and consumed exactly once;
/// `next_part` returns `None` once the closing boundary has been reached.
pub struct PartIter<'a> {
    body: &'a [u8],
    pos: usize,
    dash_boundary: Vec<u8>,
    started: bool,
    done: bool,
}

impl<'a> PartIter<'a> {
    pub fn new(body: &'a [u8], boundary: &str) -> Self {
        let mut dash_boundary = Vec::with_capacity(boundary.len() + 2);
        dash_boundary.extend_from_slice(b"--");
        dash_boundary.extend_from_slice(boundary.as_bytes());
        Self {
            body,
            pos: 0,
            dash_boundary,
            started: false,
            done: false,
        }
    }

    pub fn next_part(&mut self) -> Result<Option<Part<'a>>> {
        if self.done {
            return Ok(None);
        }
        if !self.started {
            self.started = true;
            if !self.seek_first_boundary()? {
                self.done = true;
                return Ok(None);
            }
        }

        let (headers, raw_headers) = self.read_part_headers()?;
        let data = self.read_part_content()?;

        Ok(Some(Part {
            headers,
            raw_headers,
            data,
        }))
    }

    /// Skip the preamble up to the first boundary line. Returns false when
    /// the body has zero parts (empty body, or an immediate closing boundary).
    fn seek_first_boundary(&mut self) -> Result<bool> {
        if self.body.is_empty() {
            return Ok(false);
        }
        while self.pos < self.body.len() {
            let (line, next) = self.read_line(self.pos);
            self.pos = next;
            let line = trim_trailing_ws(line);
            if line == self.dash_boundary.as_slice() {
                return Ok(true);
            }
            if self.is_close_delimiter(line) {
                return Ok(false);
            }
        }
        Err(MultipartError::MalformedBody(
            "no opening boundary".to_string(),
        ))
    }

    fn read_part_headers(&mut self) -> Result<(Vec<(String, String)>, Vec<String>)> {
        let mut headers = Vec::new();
        let mut raw_headers = Vec::new();
        loop {
            if self.pos >= self.body.len() {
                return Err(MultipartError::MalformedBody(
                    "truncated part headers".to_string(),
                ));
            }
            let (line, next) = self.read_line(self.pos);
            self.pos = next;
            let line = strip_cr(line);
            if line.is_empty() {
                return Ok((headers, raw_headers));
            }
            let text = std::str::from_utf8(line).map_err(|_| {
                MultipartError::MalformedBody("non-UTF-8 part header".to_string())
            })?;
            let (name, value) = text.split_once(':').ok_or_else(|| {
                MultipartError::MalformedBody("part header missing ':'".to_string())
            })?;
            let name = name.trim();
            let value = value.trim();
            raw_headers.push(format!("{}: {}", name, value));
            headers.push((name.to_string(), value.to_string()));
        }
    }

    /// Scan forward for the delimiter line that terminates this part's
    /// content. The newline preceding the delimiter belongs to the delimiter,
    /// not the content.
    fn read_part_content(&mut self) -> Result<&'a [u8]> {
        // the newline that ended the header block may directly precede the
        // delimiter of a zero-length part
        let mut search = self.pos.saturating_sub(1);
        loop {
            let needle_at = find_newline_boundary(&self.body[search..], &self.dash_boundary)
                .map(|off| search + off);
            let nl_pos = match needle_at {
                Some(p) => p,
                None => {
                    return Err(MultipartError::MalformedBody(
                        "missing closing boundary".to_string(),
                    ))
                }
            };

            let mut content_end = nl_pos;
            if content_end > 0 && self.body[content_end - 1] == b'\r' {
                content_end -= 1;
            }
            let content = if content_end <= self.pos {
                &self.body[self.pos..self.pos]
            } else {
                &self.body[self.pos..content_end]
            };

            let after = nl_pos + 1 + self.dash_boundary.len();
            let rest = &self.body[after..];

            if rest.starts_with(b"--") {
                // only a close delimiter when nothing but padding follows on
                // the line; `--B--xyz` is ordinary content
                let mut k = after + 2;
                while k < self.body.len() && (self.body[k] == b' ' || self.body[k] == b'\t') {
                    k += 1;
                }
                let at_line_end = match self.body.get(k) {
                    None => true,
                    Some(b'\n') => true,
                    Some(b'\r') => matches!(self.body.get(k + 1), None | Some(b'\n')),
                    _ => false,
                };
                if at_line_end {
                    // the epilogue, if any, is ignored
                    self.done = true;
                    self.pos = self.body.len();
                    return Ok(content);
                }
                // looked like a close delimiter but is not one; keep scanning
                search = nl_pos + 1;
                continue;
            }

            // normal delimiter: optional transport padding, then a newline
            let mut j = after;
            while j < self.body.len() && (self.body[j] == b' ' || self.body[j] == b'\t') {
                j += 1;
            }
            if j + 1 < self.body.len() && self.body[j] == b'\r' && self.body[j + 1] == b'\n' {
                self.pos = j + 2;
                return Ok(content);
            }
            if j < self.body.len() && self.body[j] == b'\n' {
                self.pos = j + 1;
                return Ok(content);
            }
            if j >= self.body.len() {
                return Err(MultipartError::MalformedBody(
                    "truncated boundary line".to_string(),
                ));
            }

            // the boundary bytes occurred inside content; keep scanning
            search = nl_pos + 1;
        }
    }

    fn is_close_delimiter(&self, line: &[u8]) -> bool {
        line.len() == self.dash_boundary.len() + 2
            && line.starts_with(&self.dash_boundary)
            && line.ends_with(b"--")
    }

    /// Returns (line without trailing newline, position after the newline).
    /// The final line may be unterminated.
    fn read_line(&self, from: usize) -> (&'a [u8], usize) {
        match self.body[from..].iter().position(|&b| b == b'\n') {
            Some(nl) => (&self.body[from..from + nl], from + nl + 1),
            None => (&self.body[from..], self.body.len()),
        }
    }
}

/// Find `\n` immediately followed by the dash-boundary
fn find_newline_boundary(haystack: &[u8], dash_boundary: &[u8]) -> Option<usize> {
    let needle_len = dash_boundary.len() + 1;
    if haystack.len() < needle_len {
        return None;
    }
    haystack
        .windows(needle_len)
        .position(|w| w[0] == b'\n' && &w[1..] == dash_boundary)
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn trim_trailing_ws(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b' ' | b'\t' | b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// Decompose a multipart body into the variable sink.
///
/// Fields are stored byte-for-byte under their form names; file parts record
/// name, field name and size, and are copied to temp storage when permitted.
/// The running combined size is updated after every part. A temp storage
/// failure degrades to count-and-discard and never aborts the transaction.
pub fn decompose(
    content_type: &str,
    body: &[u8],
    storage: &TempStorage,
    vars: &mut TransactionVariables,
) -> Result<()> {
    let (media_type, params) = parse_media_type(content_type)?;
    if !media_type.starts_with("multipart/") {
        return Err(MultipartError::NotMultipart);
    }
    let boundary = last_param(&params, "boundary")
        .filter(|b| !b.is_empty())
        .ok_or_else(|| MultipartError::MalformedBody("missing boundary parameter".to_string()))?
        .to_string();

    let mut parts = PartIter::new(body, &boundary);
    while let Some(part) = parts.next_part()? {
        let field_name = part.field_name();

        for line in part.raw_headers() {
            vars.add_part_header(&field_name, line);
        }

        match part.filename() {
            Some(filename) => {
                if storage.is_enabled() {
                    match storage.create() {
                        Ok(mut tmp) => match tmp.write_all(part.data) {
                            Ok(()) => vars.add_tmp_file(tmp),
                            Err(e) => {
                                warn!(error = %e, filename = %filename, "Temp file write failed, counting without storing");
                            }
                        },
                        Err(e) => {
                            warn!(error = %e, filename = %filename, "Temp file creation failed, counting without storing");
                        }
                    }
                }
                vars.add_file(&filename, &field_name, part.data.len() as u64);
            }
            None => vars.add_post_field(&field_name, part.data),
        }

        vars.add_part_bytes(part.data.len() as u64);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decompose_with(
        content_type: &str,
        body: &[u8],
        storage: &TempStorage,
    ) -> Result<TransactionVariables> {
        let mut vars = TransactionVariables::new();
        decompose(content_type, body, storage, &mut vars)?;
        Ok(vars)
    }

    #[test]
    fn test_single_field_part() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhello\r\n--B--\r\n";
        let vars =
            decompose_with("multipart/form-data; boundary=B", body, &TempStorage::disabled())
                .unwrap();

        assert_eq!(vars.post_field_values("a"), vec![b"hello".as_slice()]);
        assert_eq!(vars.combined_file_size(), 5);
        assert!(vars.files().is_empty());
    }

    #[test]
    fn test_file_part_with_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TempStorage::new(true, Some(dir.path().to_path_buf()));
        let body = b"--B\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x.txt\"\r\n\r\nabc\r\n--B--\r\n";

        let vars = decompose_with("multipart/form-data; boundary=B", body, &storage).unwrap();

        assert_eq!(vars.files(), &["x.txt"]);
        assert_eq!(vars.file_size("x.txt"), Some(3));
        assert_eq!(vars.files_names(), &["f"]);
        assert_eq!(vars.files_tmp_names().len(), 1);
        assert!(vars.post_fields().is_empty());

        let stored = std::fs::read(&vars.files_tmp_names()[0]).unwrap();
        assert_eq!(stored, b"abc");
    }

    #[test]
    fn test_file_part_without_storage() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x.txt\"\r\n\r\nabc\r\n--B--\r\n";
        let vars =
            decompose_with("multipart/form-data; boundary=B", body, &TempStorage::disabled())
                .unwrap();

        assert_eq!(vars.files(), &["x.txt"]);
        assert_eq!(vars.file_size("x.txt"), Some(3));
        assert_eq!(vars.files_names(), &["f"]);
        assert!(vars.files_tmp_names().is_empty());
        assert_eq!(vars.combined_file_size(), 3);
    }

    #[test]
    fn test_temp_storage_failure_degrades_to_count_and_discard() {
        // storage enabled but pointed at an uncreatable directory: the file
        // is still recorded and sized, only the temp copy is skipped
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let storage = TempStorage::new(true, Some(missing));
        let body = b"--B\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x.txt\"\r\n\r\nabc\r\n--B--\r\n";

        let vars = decompose_with("multipart/form-data; boundary=B", body, &storage).unwrap();

        assert_eq!(vars.files(), &["x.txt"]);
        assert_eq!(vars.file_size("x.txt"), Some(3));
        assert_eq!(vars.files_names(), &["f"]);
        assert!(vars.files_tmp_names().is_empty());
        assert_eq!(vars.combined_file_size(), 3);
    }

    #[test]
    fn test_mixed_fields_and_files() {
        let body = concat!(
            "--B\r\n",
            "Content-Disposition: form-data; name=\"a\"\r\n",
            "\r\n",
            "one\r\n",
            "--B\r\n",
            "Content-Disposition: form-data; name=\"up\"; filename=\"d.bin\"\r\n",
            "Content-Type: application/octet-stream\r\n",
            "\r\n",
            "12345\r\n",
            "--B\r\n",
            "Content-Disposition: form-data; name=\"a\"\r\n",
            "\r\n",
            "two\r\n",
            "--B--\r\n"
        )
        .as_bytes();

        let vars =
            decompose_with("multipart/form-data; boundary=B", body, &TempStorage::disabled())
                .unwrap();

        assert_eq!(
            vars.post_field_values("a"),
            vec![b"one".as_slice(), b"two".as_slice()]
        );
        assert_eq!(vars.files(), &["d.bin"]);
        assert_eq!(vars.files_names(), &["up"]);
        assert_eq!(vars.combined_file_size(), 3 + 5 + 3);
    }

    #[test]
    fn test_part_headers_recorded_for_all_parts() {
        let body = concat!(
            "--B\r\n",
            "Content-Disposition: form-data; name=\"a\"\r\n",
            "X-Custom: one\r\n",
            "\r\n",
            "v\r\n",
            "--B\r\n",
            "Content-Disposition: form-data; name=\"f\"; filename=\"x\"\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "w\r\n",
            "--B--\r\n"
        )
        .as_bytes();

        let vars =
            decompose_with("multipart/form-data; boundary=B", body, &TempStorage::disabled())
                .unwrap();

        let a_headers = &vars.part_headers()["a"];
        assert_eq!(a_headers.len(), 2);
        assert_eq!(a_headers[1], "X-Custom: one");

        let f_headers = &vars.part_headers()["f"];
        assert_eq!(f_headers[1], "Content-Type: text/plain");
    }

    #[test]
    fn test_null_bytes_pass_through() {
        let mut body = Vec::new();
        body.extend_from_slice(b"--B\r\nContent-Disposition: form-data; name=\"x\"\r\n\r\n");
        body.extend_from_slice(b"h\x00e\x00l\x00l\x00o\x00");
        body.extend_from_slice(b"\r\n--B--\r\n");

        let vars =
            decompose_with("multipart/form-data; boundary=B", &body, &TempStorage::disabled())
                .unwrap();

        assert_eq!(
            vars.post_field_values("x"),
            vec![b"h\x00e\x00l\x00l\x00o\x00".as_slice()]
        );
        assert_eq!(vars.combined_file_size(), 10);
    }

    #[test]
    fn test_no_filename_is_always_a_field() {
        let body = concat!(
            "--B\r\n",
            "Content-Disposition: form-data; name=\"x\"\r\n",
            "Content-Type: application/octet-stream\r\n",
            "\r\n",
            "\x01\x02\x03\r\n",
            "--B--\r\n"
        )
        .as_bytes();

        let vars =
            decompose_with("multipart/form-data; boundary=B", body, &TempStorage::disabled())
                .unwrap();

        assert!(vars.files().is_empty());
        assert_eq!(vars.post_field_values("x").len(), 1);
    }

    #[test]
    fn test_empty_filename_is_a_field() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"x\"; filename=\"\"\r\n\r\ndata\r\n--B--\r\n";
        let vars =
            decompose_with("multipart/form-data; boundary=B", body, &TempStorage::disabled())
                .unwrap();

        assert!(vars.files().is_empty());
        assert_eq!(vars.post_field_values("x"), vec![b"data".as_slice()]);
    }

    #[test]
    fn test_zero_length_file_part() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"f\"; filename=\"empty\"\r\n\r\n\r\n--B--\r\n";
        let vars =
            decompose_with("multipart/form-data; boundary=B", body, &TempStorage::disabled())
                .unwrap();

        assert_eq!(vars.files(), &["empty"]);
        assert_eq!(vars.file_size("empty"), Some(0));
        assert_eq!(vars.files_names(), &["f"]);
        assert_eq!(vars.combined_file_size(), 0);
    }

    #[test]
    fn test_zero_parts_body() {
        let vars = decompose_with(
            "multipart/form-data; boundary=B",
            b"--B--\r\n",
            &TempStorage::disabled(),
        )
        .unwrap();

        assert!(vars.post_fields().is_empty());
        assert!(vars.files().is_empty());
        assert_eq!(vars.combined_file_size(), 0);
    }

    #[test]
    fn test_empty_body_has_zero_parts() {
        let vars = decompose_with(
            "multipart/form-data; boundary=B",
            b"",
            &TempStorage::disabled(),
        )
        .unwrap();

        assert!(vars.post_fields().is_empty());
        assert_eq!(vars.combined_file_size(), 0);
    }

    #[test]
    fn test_preamble_is_skipped() {
        let body = b"junk before the first boundary\r\n--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nv\r\n--B--\r\n";
        let vars =
            decompose_with("multipart/form-data; boundary=B", body, &TempStorage::disabled())
                .unwrap();

        assert_eq!(vars.post_field_values("a"), vec![b"v".as_slice()]);
    }

    #[test]
    fn test_boundary_bytes_inside_content() {
        // "--Bogus" shares a prefix with the delimiter but is content
        let body = b"--B\r\nContent-Disposition: form-data; name=\"a\"\r\nX: y\r\n\r\nxx\r\n--Bogus\r\nyy\r\n--B--\r\n";
        let vars =
            decompose_with("multipart/form-data; boundary=B", body, &TempStorage::disabled())
                .unwrap();

        assert_eq!(
            vars.post_field_values("a"),
            vec![b"xx\r\n--Bogus\r\nyy".as_slice()]
        );
    }

    #[test]
    fn test_close_delimiter_with_trailing_bytes_is_content() {
        // "--B--xyz" is an ordinary content line, not the close delimiter;
        // nothing after it may be dropped from the field value
        let body = b"--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nxx\r\n--B--xyz\r\nyy\r\n--B--\r\n";
        let vars =
            decompose_with("multipart/form-data; boundary=B", body, &TempStorage::disabled())
                .unwrap();

        assert_eq!(
            vars.post_field_values("a"),
            vec![b"xx\r\n--B--xyz\r\nyy".as_slice()]
        );
        assert_eq!(vars.combined_file_size(), 16);
    }

    #[test]
    fn test_close_delimiter_with_padding() {
        // transport padding after "--B--" is allowed, with or without a
        // trailing newline
        for body in [
            b"--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nv\r\n--B-- \t\r\n".as_slice(),
            b"--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nv\r\n--B--".as_slice(),
        ] {
            let vars = decompose_with(
                "multipart/form-data; boundary=B",
                body,
                &TempStorage::disabled(),
            )
            .unwrap();
            assert_eq!(vars.post_field_values("a"), vec![b"v".as_slice()]);
        }
    }

    #[test]
    fn test_missing_closing_boundary() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhello";
        let err = decompose_with("multipart/form-data; boundary=B", body, &TempStorage::disabled())
            .unwrap_err();
        assert!(matches!(err, MultipartError::MalformedBody(_)));
    }

    #[test]
    fn test_truncated_headers() {
        let body = b"--B\r\nContent-Disposition: form-data";
        let err = decompose_with("multipart/form-data; boundary=B", body, &TempStorage::disabled())
            .unwrap_err();
        assert!(matches!(err, MultipartError::MalformedBody(_)));
    }

    #[test]
    fn test_non_multipart_content_type() {
        let err = decompose_with("application/json", b"{}", &TempStorage::disabled()).unwrap_err();
        assert!(matches!(err, MultipartError::NotMultipart));
    }

    #[test]
    fn test_malformed_content_type() {
        let err = decompose_with("", b"", &TempStorage::disabled()).unwrap_err();
        assert!(matches!(err, MultipartError::MalformedContentType));
    }

    #[test]
    fn test_missing_boundary_parameter() {
        let err = decompose_with("multipart/form-data", b"x", &TempStorage::disabled())
            .unwrap_err();
        assert!(matches!(err, MultipartError::MalformedBody(_)));
    }

    #[test]
    fn test_duplicate_boundary_param_last_wins() {
        let (_, params) =
            parse_media_type("multipart/form-data; boundary=first; boundary=second").unwrap();
        assert_eq!(last_param(&params, "boundary"), Some("second"));
    }

    #[test]
    fn test_duplicate_filename_param_last_wins() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"f\"; filename=\"a.txt\"; filename=\"b.txt\"\r\n\r\nzz\r\n--B--\r\n";
        let vars =
            decompose_with("multipart/form-data; boundary=B", body, &TempStorage::disabled())
                .unwrap();

        assert_eq!(vars.files(), &["b.txt"]);
    }

    #[test]
    fn test_quoted_boundary_with_escapes() {
        let (token, params) =
            parse_media_type("multipart/mixed; boundary=\"a\\\"b\"").unwrap();
        assert_eq!(token, "multipart/mixed");
        assert_eq!(last_param(&params, "boundary"), Some("a\"b"));
    }

    #[test]
    fn test_media_type_lowercased() {
        let (token, params) =
            parse_media_type("Multipart/Form-Data; Boundary=XyZ").unwrap();
        assert_eq!(token, "multipart/form-data");
        assert_eq!(last_param(&params, "boundary"), Some("XyZ"));
    }

    #[test]
    fn test_lf_only_line_endings() {
        let body = b"--B\nContent-Disposition: form-data; name=\"a\"\n\nhello\n--B--\n";
        let vars =
            decompose_with("multipart/form-data; boundary=B", body, &TempStorage::disabled())
                .unwrap();

        assert_eq!(vars.post_field_values("a"), vec![b"hello".as_slice()]);
        assert_eq!(vars.combined_file_size(), 5);
    }

    #[test]
    fn test_combined_size_counts_fields_and_files() {
        let body = concat!(
            "--B\r\n",
            "Content-Disposition: form-data; name=\"a\"\r\n",
            "\r\n",
            "12345\r\n",
            "--B\r\n",
            "Content-Disposition: form-data; name=\"f\"; filename=\"x\"\r\n",
            "\r\n",
            "1234567\r\n",
            "--B--\r\n"
        )
        .as_bytes();

        let vars =
            decompose_with("multipart/form-data; boundary=B", body, &TempStorage::disabled())
                .unwrap();
        assert_eq!(vars.combined_file_size(), 12);
    }
}
