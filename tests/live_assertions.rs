//! live_assertions.rs
//!
//! The HTTP page driver and the assertion client against a tiny local
//! server. The server speaks just enough HTTP/1.1 for reqwest: one request
//! per connection, then close.

use adderkit::testing::assertions::{AssertionClient, HttpPageDriver};
use adderkit::testing::definition::AssertionStep;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const SEEDED: &str = r#"<!doctype html>
<html><body>
<h1>Users</h1>
<ul>
  <li data-test-id="user">Alice</li>
  <li data-test-id="user">Bob</li>
</ul>
<a id="home" href="/">home</a>
</body></html>"#;

const EMPTY: &str = "<!doctype html>\n<html><body><h1>Users</h1><ul></ul><a id=\"back\" href=\"/\">back</a></body></html>";

fn route(path: &str) -> String {
    let (status, extra, body) = match path {
        "/" => ("200 OK", String::new(), SEEDED),
        "/empty" => ("200 OK", String::new(), EMPTY),
        "/old" => ("302 Found", "Location: /empty\r\n".to_string(), ""),
        _ => ("404 Not Found", String::new(), "<p>not found</p>"),
    };
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\n{extra}Connection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Serves [`route`] until the test ends. Returns the base URL.
async fn serve() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buffer = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buffer).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(buffer.get(..n).unwrap_or_default()),
                    }
                }
                let head = String::from_utf8_lossy(&request);
                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                let _ = stream.write_all(route(&path).as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

async fn client() -> AssertionClient<HttpPageDriver> {
    let base = serve().await;
    AssertionClient::new(HttpPageDriver::new(&base, Duration::from_secs(5)).unwrap())
}

#[tokio::test]
async fn seeded_rows_are_found() {
    let mut client = client().await;
    client
        .run_steps(&[
            AssertionStep::visit("/"),
            AssertionStep::element_exists("[data-test-id]"),
            AssertionStep::expect_property("li", "textContent", "Alice"),
        ])
        .await
        .unwrap();
    assert_eq!(client.current_path(), Some("/"));
}

#[tokio::test]
async fn missing_rows_fail_the_check() {
    let mut client = client().await;
    let err = client
        .run_steps(&[AssertionStep::visit("/empty"), AssertionStep::element_exists("[data-test-id]")])
        .await
        .unwrap_err();
    assert_eq!(err.selector, "[data-test-id]");
}

#[tokio::test]
async fn redirects_and_links_update_the_current_path() {
    let mut client = client().await;
    client.visit("/old").await.unwrap();
    client.expect_url_path("/empty").unwrap();

    client.run_step(&AssertionStep::click("#back", Some("/"))).await.unwrap();
    client.element_exists("#home").unwrap();
    assert_eq!(client.current_path(), Some("/"));
}

#[tokio::test]
async fn unreachable_servers_are_assertion_errors() {
    // Bind then drop to get a port nobody listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let driver = HttpPageDriver::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2)).unwrap();
    let mut client = AssertionClient::new(driver);
    let err = client.visit("/").await.unwrap_err();
    assert_eq!(err.selector, "/");
    assert_eq!(client.current_path(), None);
}
