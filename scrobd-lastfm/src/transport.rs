//! HTTP transport with retry and response envelope handling
//!
//! One entry point, [`Client::call`]: sign, POST form-encoded, parse
//! the `<lfm status="...">` envelope, classify failures, retry the
//! retryable ones with exponential backoff. Services layered on top
//! parse the method-specific document out of the same body.

use crate::error::{Error, Result};
use crate::signature::api_signature;
use crate::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Rate-limit responses never retry hotter than this.
const RATE_LIMIT_FLOOR: Duration = Duration::from_secs(10);

/// Root response envelope: `<lfm status="ok|failed">...</lfm>`
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "@status")]
    status: String,
    error: Option<Fault>,
}

/// `<error code="N">message</error>`
#[derive(Debug, Deserialize)]
struct Fault {
    #[serde(rename = "@code")]
    code: u32,
    #[serde(rename = "$text", default)]
    message: String,
}

impl Client {
    /// Execute one API method and return the raw response body on
    /// success. `requires_auth` adds the session key (`sk`) parameter
    /// and fails fast with [`Error::NoSession`] when none is set.
    pub(crate) async fn call(
        &self,
        method: &str,
        mut params: BTreeMap<String, String>,
        requires_auth: bool,
    ) -> Result<String> {
        params.insert("method".to_string(), method.to_string());
        params.insert("api_key".to_string(), self.api_key.clone());

        if requires_auth {
            let sk = self.session_key.as_ref().ok_or(Error::NoSession)?;
            params.insert("sk".to_string(), sk.clone());
        }

        let signature = api_signature(&params, &self.api_secret);

        let mut form: Vec<(String, String)> = params.into_iter().collect();
        form.push(("api_sig".to_string(), signature));

        let mut backoff = INITIAL_BACKOFF;
        let mut last_err = Error::Network("no attempt made".to_string());

        for attempt in 1..=MAX_ATTEMPTS {
            debug!(method, attempt, max = MAX_ATTEMPTS, "calling last.fm");

            match self.attempt(&form).await {
                Ok(body) => {
                    debug!(method, "last.fm call succeeded");
                    return Ok(body);
                }
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let sleep = retry_sleep(&err, backoff);
                    debug!(method, error = %err, ?sleep, "retrying last.fm call");
                    tokio::time::sleep(sleep).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    last_err = err;
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err)
    }

    /// One request/response cycle, no retries.
    async fn attempt(&self, form: &[(String, String)]) -> Result<String> {
        let response = self
            .http
            .post(&self.base_url)
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Error::Server(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        // Last.fm reports application errors with a 4xx status *and*
        // the failed envelope; parse the envelope before judging the
        // HTTP status so the error code taxonomy wins.
        let envelope: Envelope = quick_xml::de::from_str(&body)
            .map_err(|e| Error::Parse(format!("{} (body: {:.120})", e, body)))?;

        if envelope.status != "ok" {
            let fault = envelope.error.ok_or_else(|| {
                Error::Parse("failed response without <error> element".to_string())
            })?;
            return Err(Error::from_api_code(fault.code, fault.message.trim().to_string()));
        }

        if !status.is_success() {
            return Err(Error::Network(format!("unexpected status code: {}", status)));
        }

        Ok(body)
    }
}

/// Sleep before the next attempt: the exponential backoff, except
/// rate-limit responses never retry hotter than the floor.
fn retry_sleep(err: &Error, backoff: Duration) -> Duration {
    match err {
        Error::RateLimited { .. } => backoff.max(RATE_LIMIT_FLOOR),
        _ => backoff,
    }
}
