//! `testauth`: connect, secure the channel and authenticate.

use anyhow::{Context, anyhow};
use mailprobe_core::{ResultSink, mask};
use mailprobe_smtp::auth::select_mechanism;
use mailprobe_smtp::{Credentials, Session, TlsSnapshot};

use super::{FAILURE, RunContext, SUCCESS, greet, print_connected};
use crate::report;

/// Log columns for `testauth`.
pub const COLUMNS: &[&str] = &[
    "Action",
    "Status",
    "Server",
    "Port",
    "Username",
    "Auth_Mechanisms_Available",
    "Auth_Method_Used",
    "Auth_Result",
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
    mechanisms: String,
    method: String,
    auth_result: String,
    tls: Option<TlsSnapshot>,
}

impl Outcome {
    fn row(&self, ctx: &RunContext, status: &str, error: &str) -> Vec<String> {
        let mut row = vec![
            "testauth".to_string(),
            status.to_string(),
            ctx.config.host.clone(),
            ctx.port(),
            ctx.config.username.clone().unwrap_or_default(),
            self.mechanisms.clone(),
            self.method.clone(),
            self.auth_result.clone(),
        ];
        row.extend(report::tls_columns(self.tls.as_ref()));
        row.push(error.to_string());
        row
    }
}

/// Runs the authentication test.
///
/// # Errors
///
/// Returns the failing step's error after logging a FAILURE row.
pub async fn run(ctx: &mut RunContext, sink: &mut dyn ResultSink) -> anyhow::Result<()> {
    println!(
        "Testing SMTP authentication on {}:{}...\n",
        ctx.config.host, ctx.config.port
    );

    let mut outcome = Outcome::default();
    let result = match ctx.open_session().await {
        Ok(mut session) => {
            let result = authenticate(ctx, &mut session, &mut outcome).await;
            outcome.tls = session.tls().cloned();
            session.close().await;
            result
        }
        Err(err) => Err(err.into()),
    };

    match result {
        Ok(()) => {
            sink.write_row(&outcome.row(ctx, SUCCESS, ""))?;
            println!("\n✓ Authentication test completed successfully");
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "testauth failed");
            sink.write_row(&outcome.row(ctx, FAILURE, &err.to_string()))?;
            Err(err)
        }
    }
}

async fn authenticate(
    ctx: &RunContext,
    session: &mut Session,
    outcome: &mut Outcome,
) -> anyhow::Result<()> {
    let credentials: Credentials = ctx
        .config
        .credentials()
        .context("testauth requires a username and a password or access token")?;

    print_connected(ctx);
    greet(ctx, session).await?;
    ctx.print_tls_report(session, None);

    let available = session.capabilities().auth_mechanisms();
    if available.is_empty() {
        outcome.mechanisms = "none".to_string();
        outcome.auth_result = FAILURE.to_string();
        let msg = "Server does not advertise AUTH capability";
        println!("✗ {msg}");
        return Err(anyhow!(msg));
    }
    outcome.mechanisms = available.join(", ");
    println!(
        "✓ Server supports AUTH mechanisms: {}\n",
        outcome.mechanisms
    );

    let Some(mechanism) = select_mechanism(
        ctx.config.auth_methods.as_slice(),
        &available,
        credentials.has_token(),
    ) else {
        outcome.auth_result = FAILURE.to_string();
        let msg = format!(
            "No compatible authentication mechanism found (requested: {}, available: {})",
            ctx.config.requested_methods(),
            outcome.mechanisms
        );
        println!("✗ {msg}");
        return Err(anyhow!(msg));
    };

    outcome.method = mechanism.as_str().to_string();
    println!("Attempting authentication with method: {mechanism}");
    tracing::debug!(
        username = %mask(&credentials.username),
        mechanism = %mechanism,
        "authenticating"
    );

    match session.auth(&credentials, &[mechanism.as_str()]).await {
        Ok(_) => {
            outcome.auth_result = SUCCESS.to_string();
            println!("\n✓ Authentication successful");
            Ok(())
        }
        Err(err) => {
            outcome.auth_result = FAILURE.to_string();
            println!("\n✗ Authentication failed: {err}");
            ctx.print_tls_report(
                session,
                Some("Authentication failed. TLS Connection Details:"),
            );
            Err(err.into())
        }
    }
}
