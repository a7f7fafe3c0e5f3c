//! Liveness probes against declared dependencies.
//!
//! A failed probe is an infrastructure problem, never auto-fixable.

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::result::ValidationResult;

/// TCP connect to the database.
pub async fn probe_database(host: &str, port: u16, limit: Duration) -> ValidationResult {
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => ValidationResult::pass("database", format!("database reachable at {host}:{port}")),
        Ok(Err(e)) => ValidationResult::fail(
            "database",
            format!("database unreachable at {host}:{port}: {e}"),
        ),
        Err(_) => ValidationResult::fail(
            "database",
            format!("database at {host}:{port} timed out after {}s", limit.as_secs()),
        ),
    }
}

/// TCP connect, optional `AUTH`, then `PING` expecting `+PONG`.
pub async fn probe_cache(
    host: &str,
    port: u16,
    password: Option<&str>,
    limit: Duration,
) -> ValidationResult {
    match timeout(limit, cache_conversation(host, port, password)).await {
        Ok(Ok(())) => ValidationResult::pass("cache", format!("cache answered PING at {host}:{port}")),
        Ok(Err(reason)) => {
            ValidationResult::fail("cache", format!("cache at {host}:{port}: {reason}"))
        }
        Err(_) => ValidationResult::fail(
            "cache",
            format!("cache at {host}:{port} timed out after {}s", limit.as_secs()),
        ),
    }
}

async fn cache_conversation(host: &str, port: u16, password: Option<&str>) -> Result<(), String> {
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| format!("unreachable: {e}"))?;
    let mut stream = BufReader::new(stream);

    if let Some(password) = password {
        let reply = command(&mut stream, &format!("AUTH {password}\r\n")).await?;
        if !reply.starts_with("+OK") {
            return Err(format!("AUTH rejected: {reply}"));
        }
    }

    let reply = command(&mut stream, "PING\r\n").await?;
    if reply == "+PONG" {
        Ok(())
    } else {
        Err(format!("unexpected PING reply: {reply}"))
    }
}

async fn command(stream: &mut BufReader<TcpStream>, line: &str) -> Result<String, String> {
    stream
        .get_mut()
        .write_all(line.as_bytes())
        .await
        .map_err(|e| format!("write failed: {e}"))?;
    let mut reply = String::new();
    let n = stream
        .read_line(&mut reply)
        .await
        .map_err(|e| format!("read failed: {e}"))?;
    if n == 0 {
        return Err("connection closed".to_string());
    }
    Ok(reply.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Minimal cache that expects `AUTH secret` and answers `PING`.
    async fn fake_cache() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut socket = BufReader::new(socket);
            let mut line = String::new();
            while socket.read_line(&mut line).await.unwrap_or(0) > 0 {
                let reply = match line.trim_end() {
                    "AUTH secret" => "+OK\r\n",
                    "PING" => "+PONG\r\n",
                    _ => "-ERR invalid password\r\n",
                };
                socket.get_mut().write_all(reply.as_bytes()).await.unwrap();
                line.clear();
            }
        });
        port
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn database_probe_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let r = probe_database("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(r.passed, "{}", r.message);
    }

    #[tokio::test]
    async fn database_probe_failure_is_not_fixable() {
        let port = closed_port().await;
        let r = probe_database("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(!r.passed);
        assert!(!r.auto_fixable);
        assert!(r.is_blocking());
    }

    #[tokio::test]
    async fn cache_probe_authenticates_and_pings() {
        let port = fake_cache().await;
        let r = probe_cache("127.0.0.1", port, Some("secret"), Duration::from_secs(2)).await;
        assert!(r.passed, "{}", r.message);
    }

    #[tokio::test]
    async fn cache_probe_rejects_bad_password() {
        let port = fake_cache().await;
        let r = probe_cache("127.0.0.1", port, Some("wrong"), Duration::from_secs(2)).await;
        assert!(!r.passed);
        assert!(r.message.contains("AUTH rejected"));
    }
}
