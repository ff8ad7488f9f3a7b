//! End-to-end server lifecycle over a real socket.

use std::io::Write as _;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use aurora_server::config::ServerConfig;
use aurora_server::server::IcebergRestServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Sends one HTTP/1.1 request and returns the status code and body.
async fn http(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> Result<(u16, String)> {
    let mut stream = TcpStream::connect(addr).await.context("connect")?;
    let body = body.unwrap_or_default();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\
         Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.context("write")?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.context("read")?;
    let text = String::from_utf8(raw).context("utf-8 response")?;
    let status = text
        .split_whitespace()
        .nth(1)
        .context("status line")?
        .parse::<u16>()
        .context("status code")?;
    let body = text
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    Ok((status, body))
}

fn write_conf(dir: &std::path::Path, extra: &str) -> Result<std::path::PathBuf> {
    let path = dir.join("aurora.conf");
    let mut file = std::fs::File::create(&path)?;
    writeln!(file, "# test configuration")?;
    writeln!(file, "host = 127.0.0.1")?;
    writeln!(file, "httpPort = 9001")?;
    writeln!(file, "stopTimeout = 2000")?;
    write!(file, "{extra}")?;
    Ok(path)
}

async fn start(config_path: &std::path::Path) -> Result<(IcebergRestServer, SocketAddr)> {
    let mut config = ServerConfig::load(Some(config_path))?;
    config.http.port = 0;
    let mut server = IcebergRestServer::new(config);
    server.initialize()?;
    let addr = server.start().await?;
    Ok((server, addr))
}

#[tokio::test]
async fn test_serves_health_and_catalog_then_stops() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let conf = write_conf(dir.path(), "prefix = aurora\n")?;
    let (mut server, addr) = start(&conf).await?;

    let (status, body) = http(addr, "GET", "/health", None).await?;
    assert_eq!(status, 200);
    assert!(body.contains("\"ok\""));

    let (status, body) = http(addr, "GET", "/iceberg/v1/config", None).await?;
    assert_eq!(status, 200);
    assert!(body.contains("\"prefix\":\"aurora\""));

    let (status, _) = http(
        addr,
        "POST",
        "/iceberg/v1/aurora/namespaces",
        Some(r#"{"namespace":["sales"]}"#),
    )
    .await?;
    assert_eq!(status, 200);

    let (status, _) = http(addr, "HEAD", "/iceberg/v1/aurora/namespaces/sales", None).await?;
    assert_eq!(status, 204);

    let (status, body) = http(addr, "GET", "/iceberg/v1/other/namespaces", None).await?;
    assert_eq!(status, 400);
    assert!(body.contains("BadRequestException"));

    server.stop().await;
    assert!(TcpStream::connect(addr).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_jdbc_catalog_survives_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let extra = format!(
        "catalog-backend = jdbc\nuri = jdbc:sqlite:{root}/catalog.db\nwarehouse = {root}/warehouse\n",
        root = dir.path().display()
    );
    let conf = write_conf(dir.path(), &extra)?;

    let (mut server, addr) = start(&conf).await?;
    let (status, _) = http(
        addr,
        "POST",
        "/iceberg/v1/any/namespaces",
        Some(r#"{"namespace":["analytics"],"properties":{"owner":"data"}}"#),
    )
    .await?;
    assert_eq!(status, 200);
    server.stop().await;

    let (mut server, addr) = start(&conf).await?;
    let (status, body) = http(addr, "GET", "/iceberg/v1/any/namespaces/analytics", None).await?;
    assert_eq!(status, 200);
    assert!(body.contains("\"owner\":\"data\""));
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_invalid_conf_fails_to_load() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let conf = write_conf(dir.path(), "catalog-backend = hive\n")?;
    let err = ServerConfig::load(Some(&conf)).expect_err("hive is rejected");
    assert_eq!(
        err.to_string(),
        format!("Failed to load conf from file {}", conf.display())
    );
    let source = std::error::Error::source(&err).context("source")?;
    assert_eq!(source.to_string(), "catalog backend HIVE is not supported");
    Ok(())
}
