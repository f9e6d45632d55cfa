//! `testconnect`: banner, EHLO capabilities and Exchange fingerprint.

use mailprobe_core::ResultSink;
use mailprobe_smtp::{Error as SmtpError, Session};

use super::{FAILURE, RunContext, SUCCESS, print_connected};
use crate::exchange::{self, ExchangeInfo};

/// Log columns for `testconnect`.
pub const COLUMNS: &[&str] = &[
    "Action",
    "Status",
    "Server",
    "Port",
    "Connected",
    "Banner",
    "Capabilities",
    "Exchange_Detected",
    "Error",
];

#[derive(Debug, Default)]
struct Outcome {
    connected: bool,
    banner: String,
    capabilities: String,
    exchange: ExchangeInfo,
}

impl Outcome {
    fn row(&self, ctx: &RunContext, status: &str, error: &str) -> Vec<String> {
        vec![
            "testconnect".to_string(),
            status.to_string(),
            ctx.config.host.clone(),
            ctx.port(),
            self.connected.to_string(),
            self.banner.clone(),
            self.capabilities.clone(),
            self.exchange.is_exchange.to_string(),
            error.to_string(),
        ]
    }
}

/// Runs the connectivity test.
///
/// # Errors
///
/// Returns the connect or EHLO error after logging a FAILURE row.
pub async fn run(ctx: &mut RunContext, sink: &mut dyn ResultSink) -> anyhow::Result<()> {
    let kind = if ctx.config.security == mailprobe_smtp::Security::ImplicitTls {
        "SMTPS"
    } else {
        "SMTP"
    };
    println!(
        "Testing {kind} connectivity to {}:{}...\n",
        ctx.config.host, ctx.config.port
    );

    let mut outcome = Outcome::default();
    let result = match ctx.open_session().await {
        Ok(mut session) => {
            let result = probe(ctx, &mut session, &mut outcome).await;
            session.close().await;
            result
        }
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => {
            sink.write_row(&outcome.row(ctx, SUCCESS, ""))?;
            println!("✓ {kind} connectivity test completed successfully");
            tracing::info!(host = %ctx.config.host, "testconnect completed successfully");
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "testconnect failed");
            println!("✗ {err}");
            sink.write_row(&outcome.row(ctx, FAILURE, &err.to_string()))?;
            Err(err.into())
        }
    }
}

async fn probe(
    ctx: &RunContext,
    session: &mut Session,
    outcome: &mut Outcome,
) -> Result<(), SmtpError> {
    outcome.connected = true;
    outcome.banner = session.banner_text();
    print_connected(ctx);
    println!("  Banner: {}\n", outcome.banner);

    let caps = session.ehlo().await?;
    outcome.capabilities = caps.to_string();

    println!("Server Capabilities:");
    for (keyword, params) in caps.iter() {
        if params.is_empty() {
            println!("  • {keyword}");
        } else {
            println!("  • {keyword}: {}", params.join(", "));
        }
    }
    println!();

    outcome.exchange = exchange::detect(&ctx.config.host, &outcome.banner, caps);
    if outcome.exchange.is_exchange {
        print!("{}", outcome.exchange);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::handlers::testing;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_success_row() {
        let (port, server) = testing::serve("220 mx.test.local ESMTP ready\r\n", |line| {
            match line.split_whitespace().next().unwrap_or_default() {
                "EHLO" => testing::ehlo_reply(&["PIPELINING", "SIZE 1000", "XEXCH50"]),
                "QUIT" => "221 bye\r\n".to_string(),
                _ => "502 no\r\n".to_string(),
            }
        })
        .await;
        let dir = tempfile::tempdir().unwrap();
        let mut sink = testing::sink(dir.path(), "testconnect");
        let mut ctx = RunContext::new(
            testing::config("testconnect", port, &[]),
            CancellationToken::new(),
        );

        Action::TestConnect
            .run(&mut ctx, sink.as_mut())
            .await
            .unwrap();
        sink.close().unwrap();

        let seen = server.await.unwrap();
        assert_eq!(seen, vec!["EHLO mailprobe.local", "QUIT"]);

        let lines = testing::log_lines(dir.path());
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Timestamp,Action,Status,Server,Port,Connected"));
        assert!(lines[1].contains(",testconnect,SUCCESS,127.0.0.1,"));
        assert!(lines[1].contains(
            ",true,mx.test.local ESMTP ready,PIPELINING;SIZE=1000;XEXCH50,true,"
        ));
    }

    #[tokio::test]
    async fn test_ehlo_failure_row() {
        let (port, server) = testing::serve("220 mx.test.local ready\r\n", |line| {
            if line.starts_with("QUIT") {
                "221 bye\r\n".to_string()
            } else {
                "502 command not implemented\r\n".to_string()
            }
        })
        .await;
        let dir = tempfile::tempdir().unwrap();
        let mut sink = testing::sink(dir.path(), "testconnect");
        let mut ctx = RunContext::new(
            testing::config("testconnect", port, &[]),
            CancellationToken::new(),
        );

        let err = Action::TestConnect
            .run(&mut ctx, sink.as_mut())
            .await
            .unwrap_err();
        sink.close().unwrap();
        assert!(err.to_string().contains("502"));
        server.await.unwrap();

        let lines = testing::log_lines(dir.path());
        assert!(lines[1].contains(",testconnect,FAILURE,127.0.0.1,"));
        assert!(lines[1].contains(",true,mx.test.local ready,,false,"));
    }
}
