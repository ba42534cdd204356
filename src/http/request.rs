//! Incremental HTTP/1.1 request parser: request line, headers, and a body
//! that is either a urlencoded login/register form or a single-file
//! multipart upload.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write as _;

use crate::buffer::Buffer;
use crate::sql_pool::SqlPool;

const CRLF: &[u8] = b"\r\n";
const MAX_UPLOAD_BYTES: u64 = 30 * 1024 * 1024;

fn default_html_pages() -> &'static [&'static str] {
    &[
        "/index",
        "/register",
        "/login",
        "/welcome",
        "/video",
        "/picture",
        "/upload",
        "/success",
    ]
}

fn default_html_tag(path: &str) -> Option<u8> {
    match path {
        "/register.html" => Some(0),
        "/login.html" => Some(1),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    RequestLine,
    Header,
    Body,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    NoRequest,
    GetRequest,
    BadRequest,
    InternalError,
}

/// Context the parser needs but does not own: where uploads land and how to
/// reach the user table.
pub struct ParseContext<'a> {
    pub sql_pool: Option<&'a SqlPool>,
    pub upload_dir: &'a str,
}

pub struct HttpRequest {
    pub state: ParseState,
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub post: HashMap<String, String>,
    body: String,
    upload: bool,
    upload_error: bool,
    upload_filename: String,
    upload_file: Option<File>,
    parse_body_count: u32,
}

impl HttpRequest {
    pub fn new() -> Self {
        let mut req = HttpRequest {
            state: ParseState::RequestLine,
            method: String::new(),
            path: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            post: HashMap::new(),
            body: String::new(),
            upload: false,
            upload_error: false,
            upload_filename: String::new(),
            upload_file: None,
            parse_body_count: 0,
        };
        req.reset();
        req
    }

    /// Reinitializes every field for the next request on a keep-alive
    /// connection. Must reset `parse_body_count`, `upload`, and
    /// `upload_error` here rather than lazily, or a half-parsed state from a
    /// previous request would leak into the next one.
    pub fn reset(&mut self) {
        self.state = ParseState::RequestLine;
        self.method.clear();
        self.path.clear();
        self.version.clear();
        self.headers.clear();
        self.post.clear();
        self.body.clear();
        self.upload = false;
        self.upload_error = false;
        self.upload_filename.clear();
        self.upload_file = None;
        self.parse_body_count = 0;
    }

    pub fn is_keep_alive(&self) -> bool {
        self.headers
            .get("Connection")
            .map(|v| v == "keep-alive" && self.version == "1.1")
            .unwrap_or(false)
    }

    fn rewrite_path(&mut self) {
        if self.path == "/" {
            self.path = "/index.html".to_string();
        } else if default_html_pages().contains(&self.path.as_str()) {
            self.path.push_str(".html");
        }
    }

    fn parse_request_line(&mut self, line: &str) -> bool {
        let parts: Vec<&str> = line.splitn(3, ' ').collect();
        if parts.len() != 3 || !parts[2].starts_with("HTTP/") || parts[2].contains(' ') {
            return false;
        }
        self.method = parts[0].to_string();
        self.path = parts[1].to_string();
        self.version = parts[2]["HTTP/".len()..].to_string();
        self.state = ParseState::Header;
        self.rewrite_path();
        true
    }

    /// A line without a colon means the blank line terminating the header
    /// block; anything with a colon is a header. Mirrors the original's
    /// `^([^:]*): ?(.*)$` behavior, where any colon-free line (not just a
    /// truly empty one) ends the header phase.
    fn parse_header_line(&mut self, line: &str) {
        match line.split_once(':') {
            Some((k, v)) => {
                self.headers.insert(k.to_string(), v.trim_start().to_string());
            }
            None => self.state = ParseState::Body,
        }
    }

    fn content_length(&self) -> u64 {
        self.headers
            .get("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    fn boundary(&self) -> Option<String> {
        self.headers.get("boundary").cloned()
    }

    /// Processes one body "line" (which, per the upstream algorithm, may
    /// actually be an unterminated tail chunk when no CRLF remains in the
    /// buffer). Returns true once the body is fully parsed.
    fn parse_body_line(&mut self, line: &str, ctx: &ParseContext) -> bool {
        if !self.upload {
            if let Some(ct) = self.headers.get("Content-Type") {
                if ct.contains("multipart/form-data") {
                    self.upload = true;
                    if let Some(p) = ct.find("--") {
                        let boundary = ct[p..].to_string();
                        self.headers.insert("boundary".to_string(), boundary);
                    }
                }
            }
        }
        self.body = line.to_string();
        self.parse_body_count += 1;
        self.parse_post(ctx)
    }

    fn parse_post(&mut self, ctx: &ParseContext) -> bool {
        if self.method == "POST"
            && self.headers.get("Content-Type").map(String::as_str)
                == Some("application/x-www-form-urlencoded")
        {
            if (self.body.len() as u64) < self.content_length() {
                return false;
            }
            self.parse_urlencoded();
            if let Some(tag) = default_html_tag(&self.path) {
                let is_login = tag == 1;
                let name = self.post.get("username").cloned().unwrap_or_default();
                let pwd = self.post.get("password").cloned().unwrap_or_default();
                let ok = verify_user(&name, &pwd, is_login, ctx.sql_pool);
                self.path = if ok {
                    "/welcome.html".to_string()
                } else if is_login {
                    "/login_error.html".to_string()
                } else {
                    "/register_error.html".to_string()
                };
            }
            true
        } else if self.method == "POST" && self.upload {
            if self.content_length() > MAX_UPLOAD_BYTES {
                self.upload_error = true;
            }
            let finished = self.parse_form_data(ctx.upload_dir);
            if finished {
                self.path = if self.upload_error {
                    "/upload_error.html".to_string()
                } else {
                    "/success.html".to_string()
                };
            }
            finished
        } else {
            true
        }
    }

    fn parse_urlencoded(&mut self) {
        if self.body.is_empty() {
            return;
        }
        let bytes = self.body.as_bytes();
        let mut key = String::new();
        let mut temp = String::new();
        let mut i = 0usize;
        while i < bytes.len() {
            match bytes[i] {
                b'=' => {
                    key = std::mem::take(&mut temp);
                }
                b'+' => temp.push(' '),
                b'%' if i + 2 < bytes.len() => {
                    let hi = hex_val(bytes[i + 1]);
                    let lo = hex_val(bytes[i + 2]);
                    temp.push(((hi * 16 + lo) as u8) as char);
                    i += 2;
                }
                b'&' => {
                    let value = std::mem::take(&mut temp);
                    self.post.insert(key.clone(), value);
                }
                c => temp.push(c as char),
            }
            i += 1;
        }
        self.post.entry(key).or_insert(temp);
    }

    fn parse_form_data(&mut self, upload_dir: &str) -> bool {
        let Some(boundary) = self.boundary() else {
            return false;
        };
        let terminator = format!("--{boundary}--");
        if self.parse_body_count == 2 {
            let Some(p) = self.body.find("filename=\"") else {
                self.upload_error = true;
                return false;
            };
            let rest = &self.body[p + "filename=\"".len()..];
            let name = rest.trim_end_matches('"').to_string();
            self.upload_filename = name.clone();
            match name.rsplit_once('.') {
                Some((_, "txt")) => {
                    if !self.upload_error {
                        let full = format!("{upload_dir}/{name}");
                        self.upload_file = File::create(&full).ok();
                    }
                }
                _ => self.upload_error = true,
            }
            false
        } else if self.parse_body_count >= 5 && self.body != terminator {
            if !self.upload_error {
                if let Some(f) = self.upload_file.as_mut() {
                    let _ = f.write_all(self.body.as_bytes());
                    let _ = f.flush();
                }
            }
            false
        } else if self.body == terminator {
            self.upload_file = None;
            true
        } else {
            false
        }
    }

    /// Incrementally parses `buf`, consuming exactly as many bytes as were
    /// fully interpreted and leaving the rest for the next call.
    pub fn parse(&mut self, buf: &mut Buffer, ctx: &ParseContext) -> ParseOutcome {
        if buf.is_empty() {
            return ParseOutcome::NoRequest;
        }
        while !buf.is_empty() && self.state != ParseState::Finish {
            let found = buf.find(CRLF);
            let has_crlf = found.is_some();
            let line_end_abs = found.unwrap_or(buf.read_pos() + buf.readable_bytes());

            if !has_crlf && self.state == ParseState::Header {
                break;
            }

            let line = String::from_utf8_lossy(buf.slice_until(line_end_abs)).into_owned();
            let line_len = line.len();

            match self.state {
                ParseState::RequestLine => {
                    if !self.parse_request_line(&line) {
                        return ParseOutcome::BadRequest;
                    }
                }
                ParseState::Header => {
                    self.parse_header_line(&line);
                    if self.state == ParseState::Body && self.method == "GET" {
                        self.state = ParseState::Finish;
                        buf.retrieve_all();
                        return ParseOutcome::GetRequest;
                    }
                }
                ParseState::Body => {
                    if self.parse_body_line(&line, ctx) {
                        buf.retrieve_all();
                        return ParseOutcome::GetRequest;
                    }
                }
                ParseState::Finish => return ParseOutcome::GetRequest,
            }

            if !has_crlf && self.state == ParseState::Body {
                buf.retrieve(line_len);
            } else {
                buf.retrieve(line_len + 2);
            }
        }
        ParseOutcome::NoRequest
    }
}

impl Default for HttpRequest {
    fn default() -> Self {
        HttpRequest::new()
    }
}

fn hex_val(b: u8) -> u32 {
    match b {
        b'0'..=b'9' => (b - b'0') as u32,
        b'a'..=b'f' => (b - b'a' + 10) as u32,
        b'A'..=b'F' => (b - b'A' + 10) as u32,
        _ => 0,
    }
}

fn verify_user(name: &str, pwd: &str, is_login: bool, pool: Option<&SqlPool>) -> bool {
    if name.is_empty() || pwd.is_empty() {
        return false;
    }
    let Some(pool) = pool else {
        return false;
    };
    let Ok(mut conn) = pool.get() else {
        return false;
    };
    use mysql::prelude::Queryable;

    let mut flag = !is_login;
    let row: Option<(String, String)> = conn
        .exec_first(
            "SELECT username, password FROM user WHERE username = ? LIMIT 1",
            (name,),
        )
        .unwrap_or(None);

    if let Some((_, stored_password)) = row {
        flag = if is_login { pwd == stored_password } else { false };
    }

    if !is_login && flag {
        let insert_result = conn.exec_drop(
            "INSERT INTO user(username, password) VALUES (?, ?)",
            (name, pwd),
        );
        if insert_result.is_err() {
            flag = false;
        }
        // Preserved quirk: the client is told registration succeeded
        // regardless of whether the INSERT above actually went through.
        flag = true;
    }

    flag
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ParseContext<'static> {
        ParseContext {
            sql_pool: None,
            upload_dir: "/tmp",
        }
    }

    #[test]
    fn parses_simple_get() {
        let mut buf = Buffer::new();
        buf.append(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        let mut req = HttpRequest::new();
        let outcome = req.parse(&mut buf, &ctx());
        assert_eq!(outcome, ParseOutcome::GetRequest);
        assert_eq!(req.path, "/index.html");
        assert_eq!(req.method, "GET");
    }

    #[test]
    fn rewrites_default_page_names() {
        let mut buf = Buffer::new();
        buf.append(b"GET /login HTTP/1.1\r\nHost: x\r\n\r\n");
        let mut req = HttpRequest::new();
        req.parse(&mut buf, &ctx());
        assert_eq!(req.path, "/login.html");
    }

    #[test]
    fn bad_request_line_is_rejected() {
        let mut buf = Buffer::new();
        buf.append(b"GE T / HTTP/1.1\r\n\r\n");
        let mut req = HttpRequest::new();
        assert_eq!(req.parse(&mut buf, &ctx()), ParseOutcome::BadRequest);
    }

    #[test]
    fn incomplete_headers_return_no_request_and_keep_buffer() {
        let mut buf = Buffer::new();
        buf.append(b"GET / HTTP/1.1\r\nHost: x");
        let mut req = HttpRequest::new();
        assert_eq!(req.parse(&mut buf, &ctx()), ParseOutcome::NoRequest);
        assert_eq!(req.state, ParseState::Header);
    }

    #[test]
    fn urlencoded_body_waits_for_full_content_length() {
        let mut buf = Buffer::new();
        buf.append(
            b"POST /login.html HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 27\r\n\r\nusername=alice&password=pw",
        );
        let mut req = HttpRequest::new();
        let outcome = req.parse(&mut buf, &ctx());
        assert_eq!(outcome, ParseOutcome::GetRequest);
        assert_eq!(req.post.get("username").unwrap(), "alice");
        assert_eq!(req.post.get("password").unwrap(), "pw");
        // No SQL pool in this test context, so verify_user denies the login.
        assert_eq!(req.path, "/login_error.html");
    }

    #[test]
    fn parser_is_idempotent_byte_at_a_time() {
        let full = b"GET /welcome HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n";
        let mut whole_buf = Buffer::new();
        whole_buf.append(full);
        let mut whole_req = HttpRequest::new();
        whole_req.parse(&mut whole_buf, &ctx());

        let mut fed_buf = Buffer::new();
        let mut fed_req = HttpRequest::new();
        let mut outcome = ParseOutcome::NoRequest;
        for byte in full {
            fed_buf.append(&[*byte]);
            outcome = fed_req.parse(&mut fed_buf, &ctx());
        }
        assert_eq!(outcome, ParseOutcome::GetRequest);
        assert_eq!(whole_req.path, fed_req.path);
        assert_eq!(whole_req.method, fed_req.method);
    }
}
