use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use std::{fs, thread};

use web_engine::{Server, ServerConfig};

fn spawn_server(port: u16, src_dir: &str, timeout_ms: u64) {
    let config = ServerConfig {
        port,
        src_dir: src_dir.to_string(),
        upload_dir: format!("{}/upload", src_dir),
        timeout_ms,
        worker_threads: 2,
        sql_pool_size: 0,
        sql_user: String::new(),
        sql_password: String::new(),
        sql_db: String::new(),
        log_enabled: false,
        ..ServerConfig::default()
    };
    thread::spawn(move || {
        let mut server = Server::new(config).expect("server should bind");
        server.run().ok();
    });
    thread::sleep(Duration::from_millis(200));
}

fn read_response(stream: &mut TcpStream) -> String {
    let mut buf = [0u8; 8192];
    let n = stream.read(&mut buf).expect("read response");
    String::from_utf8_lossy(&buf[..n]).into_owned()
}

#[test]
fn get_root_serves_index_page() {
    let root = "./tmp_test_root_get";
    let _ = fs::remove_dir_all(root);
    fs::create_dir_all(format!("{root}/upload")).unwrap();
    fs::write(format!("{root}/index.html"), "<h1>hi</h1>").unwrap();

    spawn_server(18080, root, 60_000);
    let mut stream = TcpStream::connect("127.0.0.1:18080").unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();

    let resp = read_response(&mut stream);
    assert!(resp.starts_with("HTTP/1.1 200 OK"));
    assert!(resp.contains("<h1>hi</h1>"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn keep_alive_connection_serves_a_second_request() {
    let root = "./tmp_test_root_keepalive";
    let _ = fs::remove_dir_all(root);
    fs::create_dir_all(format!("{root}/upload")).unwrap();
    fs::write(format!("{root}/index.html"), "one").unwrap();

    spawn_server(18081, root, 60_000);
    let mut stream = TcpStream::connect("127.0.0.1:18081").unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    let first = read_response(&mut stream);
    assert!(first.starts_with("HTTP/1.1 200 OK"));
    assert!(first.contains("keep-alive"));

    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    let second = read_response(&mut stream);
    assert!(second.starts_with("HTTP/1.1 200 OK"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn login_without_a_database_falls_back_to_error_page() {
    let root = "./tmp_test_root_login";
    let _ = fs::remove_dir_all(root);
    fs::create_dir_all(format!("{root}/upload")).unwrap();
    fs::write(format!("{root}/login_error.html"), "nope").unwrap();

    spawn_server(18082, root, 60_000);
    let body = "username=alice&password=secret";
    let req = format!(
        "POST /login.html HTTP/1.1\r\nHost: x\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let mut stream = TcpStream::connect("127.0.0.1:18082").unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.write_all(req.as_bytes()).unwrap();

    let resp = read_response(&mut stream);
    assert!(resp.contains("nope"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn upload_writes_file_to_disk() {
    let root = "./tmp_test_root_upload";
    let _ = fs::remove_dir_all(root);
    fs::create_dir_all(format!("{root}/upload")).unwrap();
    fs::write(format!("{root}/success.html"), "done").unwrap();

    spawn_server(18083, root, 60_000);

    // The parser extracts everything from the first "--" in the Content-Type
    // value onward as the boundary, then builds the terminator as
    // "--" + that + "--" (request.rs's parse_form_data). With
    // `boundary=----b` the extracted boundary is "----b", so the wire
    // delimiter between parts is "--" + "----b" = "------b" and the closing
    // terminator is "------b--".
    let body = "------b\r\nContent-Disposition: form-data; name=\"file\"; filename=\"note.txt\"\r\n\
                Content-Type: text/plain\r\n\r\nline one\r\nline two\r\n------b--";
    let req = format!(
        "POST /upload HTTP/1.1\r\nHost: x\r\nContent-Type: multipart/form-data; boundary=----b\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let mut stream = TcpStream::connect("127.0.0.1:18083").unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.write_all(req.as_bytes()).unwrap();

    let resp = read_response(&mut stream);
    assert!(resp.contains("done"));

    let uploaded = fs::read_to_string(format!("{root}/upload/note.txt")).unwrap();
    assert!(uploaded.contains("line one"));
    assert!(uploaded.contains("line two"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn malformed_request_line_returns_bad_request() {
    let root = "./tmp_test_root_badreq";
    let _ = fs::remove_dir_all(root);
    fs::create_dir_all(format!("{root}/upload")).unwrap();
    fs::write(format!("{root}/400.html"), "bad").unwrap();

    spawn_server(18084, root, 60_000);
    let mut stream = TcpStream::connect("127.0.0.1:18084").unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.write_all(b"GET ONLY_ONE_TOKEN\r\n\r\n").unwrap();

    let resp = read_response(&mut stream);
    assert!(resp.starts_with("HTTP/1.1 400"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn idle_connection_is_closed_after_its_timeout() {
    let root = "./tmp_test_root_idle";
    let _ = fs::remove_dir_all(root);
    fs::create_dir_all(format!("{root}/upload")).unwrap();

    spawn_server(18085, root, 300);
    let mut stream = TcpStream::connect("127.0.0.1:18085").unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    thread::sleep(Duration::from_millis(800));

    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "server should have closed the idle connection");

    let _ = fs::remove_dir_all(root);
}
