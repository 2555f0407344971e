//! Shared HTTP client and rate-limit friendly send helper.

use anyhow::{anyhow, Result};
use rand::{thread_rng, Rng};
use std::sync::OnceLock;
use std::time::Duration;

static HTTP: OnceLock<reqwest::Client> = OnceLock::new();

pub fn http_client() -> Result<&'static reqwest::Client> {
    if let Some(client) = HTTP.get() {
        return Ok(client);
    }
    let client = reqwest::Client::builder()
        .user_agent(concat!("sigcrawl/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(2)
        .tcp_nodelay(true)
        .build()
        .map_err(|e| anyhow!("Failed to build HTTP client: {e}"))?;
    Ok(HTTP.get_or_init(|| client))
}

/// Send a request, retrying transport errors and 429/5xx responses.
///
/// With `max_retries == 0` the first outcome is returned as-is.
pub async fn send_with_backoff(
    rb: reqwest::RequestBuilder,
    label: &str,
    max_retries: u8,
) -> Result<reqwest::Response> {
    let mut attempt = 0u8;
    loop {
        let req = rb
            .try_clone()
            .ok_or_else(|| anyhow!("request for {label} cannot be retried"))?;
        match req.send().await {
            Ok(r) => {
                if is_transient(r.status().as_u16()) && attempt < max_retries {
                    attempt += 1;
                    let back_ms = backoff_delay_ms(attempt);
                    log::warn!(
                        "[net] {} {} retry={} backoff={}ms",
                        r.status().as_u16(),
                        label,
                        attempt,
                        back_ms
                    );
                    tokio::time::sleep(Duration::from_millis(back_ms)).await;
                    continue;
                }
                return Ok(r);
            }
            Err(e) => {
                if attempt < max_retries {
                    attempt += 1;
                    let back_ms = backoff_delay_ms(attempt);
                    log::warn!(
                        "[net] err {} retry={} backoff={}ms : {}",
                        label,
                        attempt,
                        back_ms,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(back_ms)).await;
                    continue;
                }
                return Err(anyhow!("request to {label} failed: {e}"));
            }
        }
    }
}

fn is_transient(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn backoff_delay_ms(attempt: u8) -> u64 {
    // 300,600,1200,2400,4800,9600
    let base = 300u64.saturating_mul(1u64 << (attempt.clamp(1, 6) - 1));
    let jitter: u64 = thread_rng().gen_range(0..=250);
    base + jitter
}
