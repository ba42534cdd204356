//! Status line + header builder with a memory-mapped, zero-copy file body.

use std::fs::File;
use std::io::IoSlice;
use std::path::Path;

use memmap2::Mmap;

fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Internal Server Error",
    }
}

fn mime_type(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

pub struct HttpResponse {
    pub code: u16,
    pub keep_alive: bool,
    header: Vec<u8>,
    mapped: Option<Mmap>,
    inline_body: Vec<u8>,
}

impl HttpResponse {
    pub fn new() -> Self {
        HttpResponse {
            code: 200,
            keep_alive: false,
            header: Vec::new(),
            mapped: None,
            inline_body: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.code = 200;
        self.keep_alive = false;
        self.header.clear();
        self.mapped = None;
        self.inline_body.clear();
    }

    /// Resolves `src_dir + path`, memory-maps the file, and builds the
    /// status line + headers. Missing/forbidden targets fall back to the
    /// matching error page once; if even that is missing, an inline plain
    /// text body is used instead of a mapping.
    pub fn build(&mut self, src_dir: &str, path: &str, keep_alive: bool, code: u16) {
        self.reset();
        self.keep_alive = keep_alive;
        self.code = code;

        if self.try_map(src_dir, path) {
            self.finish_headers(path);
            return;
        }

        // `try_map` sets `self.code = 403` itself when the target is a
        // directory; any other failure (missing file) means 404.
        if self.code != 403 {
            self.code = 404;
        }
        let fallback_path = if self.code == 403 { "/403.html" } else { "/404.html" };
        if self.try_map(src_dir, fallback_path) {
            self.finish_headers(fallback_path);
        } else {
            self.error_content(self.code);
        }
    }

    fn try_map(&mut self, src_dir: &str, path: &str) -> bool {
        let full = format!("{}{}", src_dir.trim_end_matches('/'), path);
        let meta = match std::fs::metadata(&full) {
            Ok(m) => m,
            Err(_) => return false,
        };
        if meta.is_dir() {
            self.code = 403;
            return false;
        }
        let file = match File::open(&full) {
            Ok(f) => f,
            Err(_) => return false,
        };
        if meta.len() == 0 {
            self.mapped = None;
            return true;
        }
        match unsafe { Mmap::map(&file) } {
            Ok(m) => {
                self.mapped = Some(m);
                true
            }
            Err(_) => false,
        }
    }

    fn body_len(&self) -> usize {
        self.mapped.as_ref().map(|m| m.len()).unwrap_or(0)
    }

    fn finish_headers(&mut self, path: &str) {
        let mut header = format!(
            "HTTP/1.1 {} {}\r\n",
            self.code,
            reason_phrase(self.code)
        );
        if self.keep_alive {
            header.push_str("Connection: keep-alive\r\nkeep-alive: max=6, timeout=120\r\n");
        } else {
            header.push_str("Connection: close\r\n");
        }
        header.push_str(&format!("Content-Type: {}\r\n", mime_type(path)));
        header.push_str(&format!("Content-Length: {}\r\n\r\n", self.body_len()));
        self.header = header.into_bytes();
    }

    /// Used when no file (not even an error page) can be served.
    pub fn error_content(&mut self, code: u16) {
        self.code = code;
        self.mapped = None;
        let body = format!("{} {}", code, reason_phrase(code));
        self.inline_body = body.into_bytes();
        let mut header = format!("HTTP/1.1 {} {}\r\n", code, reason_phrase(code));
        header.push_str("Connection: close\r\n");
        header.push_str("Content-Type: text/plain\r\n");
        header.push_str(&format!("Content-Length: {}\r\n\r\n", self.inline_body.len()));
        self.header = header.into_bytes();
    }

    /// Two-entry scatter/gather vector: header bytes, then either the
    /// memory-mapped file or the inline fallback body.
    pub fn iovecs(&self) -> Vec<IoSlice<'_>> {
        self.iovecs_from(0)
    }

    fn body_bytes(&self) -> &[u8] {
        if let Some(m) = &self.mapped {
            &m[..]
        } else {
            &self.inline_body
        }
    }

    /// Same two-entry vector, but with the first `skip` bytes of the
    /// combined header+body stream already accounted for — used to resume a
    /// partially completed `writev`.
    pub fn iovecs_from(&self, skip: usize) -> Vec<IoSlice<'_>> {
        let mut v = Vec::with_capacity(2);
        if skip < self.header.len() {
            v.push(IoSlice::new(&self.header[skip..]));
            let body = self.body_bytes();
            if !body.is_empty() {
                v.push(IoSlice::new(body));
            }
        } else {
            let body_skip = skip - self.header.len();
            let body = self.body_bytes();
            if body_skip < body.len() {
                v.push(IoSlice::new(&body[body_skip..]));
            }
        }
        v
    }

    pub fn total_len(&self) -> usize {
        self.header.len() + self.body_len() + self.inline_body.len()
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        HttpResponse::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn serves_existing_file_with_keep_alive_header() {
        let dir = std::env::temp_dir().join("web_engine_response_test");
        std::fs::create_dir_all(&dir).unwrap();
        let mut f = File::create(dir.join("index.html")).unwrap();
        f.write_all(b"<html></html>").unwrap();

        let mut resp = HttpResponse::new();
        resp.build(dir.to_str().unwrap(), "/index.html", true, 200);
        assert_eq!(resp.code, 200);
        let header = String::from_utf8_lossy(&resp.header).into_owned();
        assert!(header.contains("keep-alive"));
        assert!(header.contains("Content-Type: text/html"));
        assert_eq!(resp.total_len(), resp.header.len() + 13);
    }

    #[test]
    fn missing_file_without_error_page_falls_back_to_inline_body() {
        let dir = std::env::temp_dir().join("web_engine_response_test_missing");
        std::fs::create_dir_all(&dir).unwrap();
        let mut resp = HttpResponse::new();
        resp.build(dir.to_str().unwrap(), "/nope.html", false, 200);
        assert_eq!(resp.code, 404);
        assert!(!resp.inline_body.is_empty());
    }
}
