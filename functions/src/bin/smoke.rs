//! Tripwire Smoke - checks a deployed instance end to end.
//!
//! Usage: `tripwire-smoke <base-url> [id-token]`
//!
//! The ID token may also come from `TRIPWIRE_ID_TOKEN`. Runs the greeting
//! checks against `/helloWorld`:
//! 1. no credentials → 403
//! 2. a bogus token → 403
//! 3. the real token → 200 (skipped without a token)
//!
//! Exits non-zero if any check fails.

use std::env;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::{Client, StatusCode};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tripwire::web::{GREETING_MESSAGE, UNAUTHORIZED_MESSAGE};

const CLIENT_ID: &str = "tripwire-smoke";

struct Check {
    name: &'static str,
    token: Option<String>,
    expected_status: StatusCode,
    expected_body: &'static str,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %format!("{:#}", e), "smoke_aborted");
            ExitCode::from(2)
        }
    }
}

async fn run() -> Result<bool> {
    let mut args = env::args().skip(1);
    let Some(base_url) = args.next() else {
        bail!("usage: tripwire-smoke <base-url> [id-token]");
    };
    let token = args.next().or_else(|| env::var("TRIPWIRE_ID_TOKEN").ok());

    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;
    let url = format!("{}/helloWorld", base_url.trim_end_matches('/'));

    let mut checks = vec![
        Check {
            name: "refuses_missing_credentials",
            token: None,
            expected_status: StatusCode::FORBIDDEN,
            expected_body: UNAUTHORIZED_MESSAGE,
        },
        Check {
            name: "refuses_unknown_token",
            token: Some("BIG CHUNGUS".to_string()),
            expected_status: StatusCode::FORBIDDEN,
            expected_body: UNAUTHORIZED_MESSAGE,
        },
    ];
    match token {
        Some(token) => checks.push(Check {
            name: "accepts_valid_token",
            token: Some(token),
            expected_status: StatusCode::OK,
            expected_body: GREETING_MESSAGE,
        }),
        None => warn!(check = "accepts_valid_token", "smoke_check_skipped"),
    }

    let mut all_passed = true;
    for check in &checks {
        let mut request = client.get(&url).header("X-Client-ID", CLIENT_ID);
        if let Some(token) = &check.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Request for {} failed", check.name))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == check.expected_status && body == check.expected_body {
            info!(check = check.name, status_code = status.as_u16(), "smoke_check_passed");
        } else {
            all_passed = false;
            error!(
                check = check.name,
                status_code = status.as_u16(),
                expected_status = check.expected_status.as_u16(),
                body = %body,
                expected_body = check.expected_body,
                "smoke_check_failed"
            );
        }
    }

    Ok(all_passed)
}
