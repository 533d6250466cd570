//! Exercises `HttpApi` against a minimal HTTP/1.1 server on a local socket.

use emotion_client::{EmotionApi, HttpApi};
use serde_json::json;
use shared::{ResultId, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

struct Reply {
    status: &'static str,
    headers: Vec<String>,
    body: String,
}

impl Reply {
    fn json(body: serde_json::Value) -> Self {
        Self {
            status: "200 OK",
            headers: vec!["Content-Type: application/json".to_string()],
            body: body.to_string(),
        }
    }

    fn html(status: &'static str, body: &str) -> Self {
        Self {
            status,
            headers: vec!["Content-Type: text/html".to_string()],
            body: body.to_string(),
        }
    }
}

/// Answers one connection per reply, in order, and returns the raw requests.
async fn serve(replies: Vec<Reply>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for reply in replies {
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);

            let mut response = format!("HTTP/1.1 {}\r\n", reply.status);
            for header in &reply.headers {
                response.push_str(header);
                response.push_str("\r\n");
            }
            response.push_str(&format!(
                "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                reply.body.len(),
                reply.body
            ));
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
        requests
    });

    (base, handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok());

        match content_length {
            Some(len) if buf.len() >= end + 4 + len => break,
            Some(_) => continue,
            None if head.contains("transfer-encoding: chunked") => {
                if buf.ends_with(b"0\r\n\r\n") {
                    break;
                }
            }
            None => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn api(base: &str) -> HttpApi {
    HttpApi::new(&ServerConfig {
        base_url: base.to_string(),
        timeout_seconds: 5,
        ..ServerConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn frame_is_posted_as_multipart_image_field() {
    let (base, server) = serve(vec![Reply::json(json!({
        "results": [{
            "region": { "x": 1, "y": 2, "w": 3, "h": 4 },
            "dominant_emotion": "fear",
            "confidence": 42.0,
            "emotions": { "fear": 42.0 }
        }]
    }))])
    .await;

    let response = api(&base).analyze_frame(vec![0xFF, 0xD8, 0xFF]).await.unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].dominant_emotion, "fear");

    let requests = server.await.unwrap();
    let request = requests[0].to_lowercase();
    assert!(request.starts_with("post /analyze_realtime "));
    assert!(request.contains("multipart/form-data"));
    assert!(request.contains("name=\"image\""));
    assert!(request.contains("filename=\"frame.jpg\""));
    assert!(request.contains("content-type: image/jpeg"));
}

#[tokio::test]
async fn error_body_on_failure_status_is_still_decoded() {
    let (base, server) = serve(vec![Reply {
        status: "500 INTERNAL SERVER ERROR",
        ..Reply::json(json!({ "error": "No result from DeepFace" }))
    }])
    .await;

    let response = api(&base).analyze_frame(vec![1, 2, 3]).await.unwrap();
    assert_eq!(response.error.as_deref(), Some("No result from DeepFace"));
    server.await.unwrap();
}

#[tokio::test]
async fn non_json_body_is_an_error() {
    let (base, server) = serve(vec![Reply::html("200 OK", "<html>login</html>")]).await;

    assert!(api(&base).analyze_frame(vec![1]).await.is_err());
    server.await.unwrap();
}

#[tokio::test]
async fn single_image_keeps_its_file_name() {
    let body = json!({ "results": [], "file_path": "static/uploads/me.png" });
    let (base, server) = serve(vec![Reply::json(body.clone())]).await;

    let value = api(&base).analyze_image("me.png", vec![7; 16]).await.unwrap();
    assert_eq!(value, body);

    let request = server.await.unwrap().remove(0).to_lowercase();
    assert!(request.starts_with("post /analyze "));
    assert!(request.contains("filename=\"me.png\""));
    assert!(request.contains("content-type: image/png"));
}

#[tokio::test]
async fn save_posts_the_analysis_as_json() {
    let analysis = json!({ "results": [{ "dominant_emotion": "happy" }], "file_path": "a.jpg" });
    let (base, server) = serve(vec![Reply::json(json!({ "success": true }))]).await;

    let response = api(&base).save_result(&analysis).await.unwrap();
    assert!(response.success);

    let request = server.await.unwrap().remove(0);
    assert!(request.starts_with("POST /save_result "));
    assert!(request.to_lowercase().contains("content-type: application/json"));
    let body = request.split("\r\n\r\n").nth(1).unwrap();
    assert_eq!(serde_json::from_str::<serde_json::Value>(body).unwrap(), analysis);
}

#[tokio::test]
async fn login_session_cookie_is_reused() {
    let (base, server) = serve(vec![
        Reply {
            status: "302 FOUND",
            headers: vec![
                "Location: /".to_string(),
                "Set-Cookie: session=abc123; Path=/".to_string(),
            ],
            body: String::new(),
        },
        Reply::html("200 OK", "<html>home</html>"),
        Reply::json(json!({ "success": false, "error": "Not found" })),
    ])
    .await;

    let api = api(&base);
    api.login("alice", "secret").await.unwrap();
    let response = api.delete_result(ResultId(7)).await.unwrap();
    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("Not found"));

    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("POST /login "));
    assert!(requests[0].contains("username=alice&password=secret"));
    assert!(requests[2].starts_with("POST /delete_result/7 "));
    assert!(requests[2].to_lowercase().contains("cookie: session=abc123"));
}

#[tokio::test]
async fn login_page_rerender_means_rejected() {
    let (base, server) = serve(vec![Reply::html("200 OK", "<html>bad credentials</html>")]).await;

    assert!(api(&base).login("alice", "wrong").await.is_err());
    server.await.unwrap();
}

#[tokio::test]
async fn login_page_under_a_path_prefix_means_rejected() {
    let (base, server) = serve(vec![Reply::html("200 OK", "<html>bad credentials</html>")]).await;

    let api = api(&format!("{}/app", base));
    assert!(api.login("alice", "wrong").await.is_err());

    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("POST /app/login "));
}
