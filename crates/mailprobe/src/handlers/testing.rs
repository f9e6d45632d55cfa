//! Scripted SMTP server and fixtures for handler tests.

#![allow(clippy::unwrap_used)]

use std::path::Path;

use clap::Parser;
use mailprobe_core::{ResultSink, open_sink};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::cli::Cli;
use crate::config::Config;

/// Plaintext config for `action` against 127.0.0.1:`port`.
pub fn config(action: &str, port: u16, extra: &[&str]) -> Config {
    let port = port.to_string();
    let mut argv = vec![
        "mailprobe",
        action,
        "--host",
        "127.0.0.1",
        "--port",
        port.as_str(),
        "--security",
        "plain",
        "--timeout",
        "5",
    ];
    argv.extend_from_slice(extra);
    Config::from_cli(Cli::try_parse_from(argv).unwrap()).unwrap()
}

/// CSV sink in `dir` for `action`.
pub fn sink(dir: &Path, action: &str) -> Box<dyn ResultSink> {
    open_sink(
        mailprobe_core::LogFormat::Csv,
        Some(dir),
        "mailprobe",
        action,
    )
    .unwrap()
}

/// Serves one connection: sends `banner`, then answers each command line
/// with `respond(line)`. Message content between DATA and the final dot is
/// recorded but not answered. Returns every line received.
pub async fn serve<F>(banner: &'static str, respond: F) -> (u16, JoinHandle<Vec<String>>)
where
    F: Fn(&str) -> String + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        let mut seen = Vec::new();
        let mut in_data = false;

        write.write_all(banner.as_bytes()).await.unwrap();
        while let Ok(Some(line)) = lines.next_line().await {
            seen.push(line.clone());
            if in_data {
                if line == "." {
                    in_data = false;
                    write.write_all(respond(".").as_bytes()).await.unwrap();
                }
                continue;
            }

            let reply = respond(&line);
            if line.eq_ignore_ascii_case("DATA") && reply.starts_with("354") {
                in_data = true;
            }
            if write.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
            if line.eq_ignore_ascii_case("QUIT") {
                break;
            }
        }
        seen
    });

    (port, handle)
}

/// Standard replies for a cooperative server with the given EHLO extensions.
pub fn ehlo_reply(extensions: &[&str]) -> String {
    let mut lines = vec!["mx.test.local Hello"];
    lines.extend_from_slice(extensions);
    let last = lines.len() - 1;
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let sep = if i == last { ' ' } else { '-' };
            format!("250{sep}{line}\r\n")
        })
        .collect()
}

/// Reads the log rows (header included) written under `dir`.
pub fn log_lines(dir: &Path) -> Vec<String> {
    let entry = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().is_some_and(|ext| ext == "csv"))
        .unwrap();
    std::fs::read_to_string(entry)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}
