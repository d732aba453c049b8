//! One-shot local HTTP responder for download tests.

use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Answers the first request on a random local port with `status_line` and
/// `body`, then closes. Returns a URL ending in `/<file_name>`.
pub async fn serve_once(status_line: &'static str, body: Vec<u8>, file_name: &str) -> io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = [0_u8; 1024];
        let _ = socket.read(&mut request).await;
        let header = format!(
            "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        if socket.write_all(header.as_bytes()).await.is_ok() && socket.write_all(&body).await.is_ok() {
            let _ = socket.shutdown().await;
        }
    });
    Ok(format!("http://{addr}/{file_name}"))
}
