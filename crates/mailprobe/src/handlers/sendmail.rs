//! `sendmail`: deliver one plain-text test message.

use anyhow::Context;
use chrono::Utc;
use mailprobe_core::{ResultSink, mask};
use mailprobe_smtp::{Address, Session, TlsSnapshot};

use super::{FAILURE, RunContext, SUCCESS, greet, print_connected};
use crate::message::{self, TestMessage};
use crate::report;

/// Log columns for `sendmail`.
pub const COLUMNS: &[&str] = &[
    "Action",
    "Status",
    "Server",
    "Port",
    "From",
    "To",
    "Subject",
    "SMTP_Response_Code",
    "Message_ID",
    "TLS_Version",
    "Cipher_Suite",
    "Cipher_Strength",
    "Cert_Subject",
    "Cert_Issuer",
    "Cert_SANs",
    "Cert_Valid_From",
    "Cert_Valid_To",
    "Cert_Verification_Status",
    "Error",
];

#[derive(Debug, Default)]
struct Outcome {
    response_code: Option<u16>,
    message_id: String,
    tls: Option<TlsSnapshot>,
}

impl Outcome {
    fn row(&self, ctx: &RunContext, status: &str, error: &str) -> Vec<String> {
        let config = &ctx.config;
        let mut row = vec![
            "sendmail".to_string(),
            status.to_string(),
            config.host.clone(),
            ctx.port(),
            config
                .from
                .as_ref()
                .map(|a| a.as_str().to_string())
                .unwrap_or_default(),
            config.recipients(),
            config.subject.clone(),
            self.response_code
                .map(|c| c.to_string())
                .unwrap_or_default(),
            self.message_id.clone(),
        ];
        row.extend(report::tls_columns(self.tls.as_ref()));
        row.push(error.to_string());
        row
    }
}

/// Sends the test message.
///
/// # Errors
///
/// Returns the failing step's error after logging a FAILURE row.
pub async fn run(ctx: &mut RunContext, sink: &mut dyn ResultSink) -> anyhow::Result<()> {
    println!(
        "Sending test email via {}:{}...\n",
        ctx.config.host, ctx.config.port
    );
    if let Some(from) = &ctx.config.from {
        println!("From:    {from}");
    }
    println!("To:      {}", ctx.config.recipients());
    println!("Subject: {}\n", ctx.config.subject);

    let mut outcome = Outcome::default();
    let result = match ctx.open_session().await {
        Ok(mut session) => {
            let result = deliver(ctx, &mut session, &mut outcome).await;
            outcome.tls = session.tls().cloned();
            session.close().await;
            result
        }
        Err(err) => Err(err.into()),
    };

    match result {
        Ok(()) => {
            sink.write_row(&outcome.row(ctx, SUCCESS, ""))?;
            println!("\n✓ Email sending test completed successfully");
            tracing::info!(message_id = %outcome.message_id, "sendmail completed successfully");
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "sendmail failed");
            println!("✗ {err}");
            sink.write_row(&outcome.row(ctx, FAILURE, &err.to_string()))?;
            Err(err)
        }
    }
}

async fn deliver(
    ctx: &RunContext,
    session: &mut Session,
    outcome: &mut Outcome,
) -> anyhow::Result<()> {
    let config = &ctx.config;
    let from: &Address = config.from.as_ref().context("sendmail requires --from")?;

    print_connected(ctx);
    greet(ctx, session).await?;
    ctx.print_tls_report(session, None);

    if let Some(credentials) = config.credentials() {
        println!("Authenticating...");
        tracing::debug!(username = %mask(&credentials.username), "authenticating before send");
        if let Err(err) = session
            .auth(&credentials, config.auth_methods.as_slice())
            .await
        {
            outcome.response_code = err.reply_code();
            ctx.print_tls_report(
                session,
                Some("Authentication failed. TLS Connection Details:"),
            );
            return Err(err.into());
        }
        println!("✓ Authentication successful");
    }

    outcome.message_id = message::message_id(&config.host, Utc::now());
    let recipients: Vec<&str> = config.to.iter().map(Address::as_str).collect();
    let body = TestMessage {
        id: &outcome.message_id,
        date: Utc::now(),
        from: from.as_str(),
        to: &recipients,
        subject: &config.subject,
        body: &config.body,
    }
    .render();

    println!("\nSending message...");
    match session.send_mail(from, &config.to, body.as_bytes()).await {
        Ok(reply) => {
            outcome.response_code = Some(reply.code.as_u16());
            println!("✓ Message sent successfully");
            println!("  Message-ID: <{}>", outcome.message_id);
            Ok(())
        }
        Err(err) => {
            outcome.response_code = err.reply_code();
            Err(err.into())
        }
    }
}
