//! Loopback Scenarios
//!
//! Self-checks that drive the engine against itself: the harness plays the
//! platform under test by posting callbacks to its own listeners and by
//! serving state from memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use url::Url;

use crate::runtime::{PollWaiter, StateSource, ValidationResult, ValidationTask};
use crate::testing::{TestCase, TestContext};

const CALLBACK_WAIT: Duration = Duration::from_secs(5);

async fn post_status(client: &reqwest::Client, url: &Url, status: &str) -> anyhow::Result<()> {
    client
        .post(url.clone())
        .json(&json!({ "status": status, "source": "loopback" }))
        .send()
        .await
        .with_context(|| format!("posting '{status}' to {url}"))?
        .error_for_status()?;
    Ok(())
}

/// Recording start and completion delivered through one listener
pub struct ListenerRoundTrip;

#[async_trait]
impl TestCase for ListenerRoundTrip {
    fn name(&self) -> &str {
        "tc101_listener_round_trip"
    }

    fn tags(&self) -> &[&'static str] {
        &["smoke", "listener"]
    }

    fn order(&self) -> Option<i32> {
        Some(0)
    }

    async fn run(&self, ctx: &mut TestContext) -> anyhow::Result<()> {
        tracing::info!("🧪 Listener round trip on {}", ctx.resource());

        let key = format!("rec-{}", ctx.resource());
        let listener = ctx.open_listener(&key).await?;
        let client = reqwest::Client::new();

        post_status(&client, listener.url(), "RecordingStarted").await?;
        post_status(&client, listener.url(), "RecordingComplete").await?;

        listener.wait_for("RecordingStarted", CALLBACK_WAIT).await?;
        let complete = listener.wait_for("RecordingComplete", CALLBACK_WAIT).await?;
        if complete.payload["source"] != "loopback" {
            bail!("payload was not preserved: {}", complete.payload);
        }

        listener.close().await;
        tracing::info!("✅ Listener round trip: PASSED");
        Ok(())
    }
}

/// In-memory state store standing in for the platform's read API
#[derive(Debug, Default, Clone)]
pub struct InMemoryState {
    entries: Arc<Mutex<HashMap<String, Value>>>,
}

impl InMemoryState {
    pub fn set(&self, key: &str, state: Value) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), state);
    }
}

#[async_trait]
impl StateSource for InMemoryState {
    async fn fetch_state(&self, key: &str) -> anyhow::Result<Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .with_context(|| format!("no state recorded for '{key}'"))
    }
}

/// Archival transition observed only by polling
pub struct PollUntilArchived;

#[async_trait]
impl TestCase for PollUntilArchived {
    fn name(&self) -> &str {
        "tc102_poll_until_archived"
    }

    fn tags(&self) -> &[&'static str] {
        &["poll"]
    }

    async fn run(&self, ctx: &mut TestContext) -> anyhow::Result<()> {
        let key = format!("rec-{}", ctx.resource());
        let state = InMemoryState::default();

        let platform = state.clone();
        let platform_key = key.clone();
        tokio::spawn(async move {
            platform.set(&platform_key, json!({ "storage": "active" }));
            tokio::time::sleep(Duration::from_millis(150)).await;
            platform.set(&platform_key, json!({ "storage": "archive", "copies": 1 }));
        });

        let waiter = PollWaiter::new(Duration::from_millis(50), ctx.poll_waiter().timeout().min(CALLBACK_WAIT));
        let report = waiter
            .poll_state(&state, &key, |s| s["storage"] == "archive")
            .await?;

        ctx.set_message(format!("archived after {} polls", report.attempts));
        tracing::info!("✅ Poll until archived: PASSED ({} attempts)", report.attempts);
        Ok(())
    }
}

/// Independent callback checks for several recordings at once
pub struct ValidationFanOut {
    pub recordings: usize,
}

impl Default for ValidationFanOut {
    fn default() -> Self {
        Self { recordings: 5 }
    }
}

#[async_trait]
impl TestCase for ValidationFanOut {
    fn name(&self) -> &str {
        "tc103_validation_fan_out"
    }

    fn tags(&self) -> &[&'static str] {
        &["validation"]
    }

    fn order(&self) -> Option<i32> {
        Some(-1)
    }

    async fn run(&self, ctx: &mut TestContext) -> anyhow::Result<()> {
        let mut listeners = Vec::with_capacity(self.recordings);
        for i in 1..=self.recordings {
            let key = format!("rec-{}-{i}", ctx.resource());
            listeners.push(ctx.open_listener(&key).await?);
        }

        let client = reqwest::Client::new();
        let harness = ctx.validation_harness(self.recordings)?;

        for listener in &listeners {
            let listener = listener.clone();
            let client = client.clone();
            let label = listener.key().to_string();
            harness.submit(ValidationTask::new(label.clone(), async move {
                if let Err(e) = post_status(&client, listener.url(), "Archived").await {
                    return ValidationResult::fail(format!("{label}: {e:#}"));
                }
                match listener.wait_for("Archived", CALLBACK_WAIT).await {
                    Ok(_) => ValidationResult::pass(format!("{label}: archived")),
                    Err(e) => ValidationResult::fail(format!("{label}: {e}")),
                }
            }))?;
        }

        let results = harness
            .collect_all(self.recordings, CALLBACK_WAIT * 2)
            .await?;
        harness.shutdown().await;

        for listener in &listeners {
            listener.close().await;
        }

        let failures: Vec<_> = results.iter().filter(|r| !r.success).map(|r| r.detail.as_str()).collect();
        if !failures.is_empty() {
            ctx.set_message(format!("{} of {} recordings failed", failures.len(), results.len()));
            bail!("validation failures: {}", failures.join("; "));
        }

        tracing::info!("✅ Validation fan-out: PASSED ({} recordings)", results.len());
        Ok(())
    }
}

/// Every loopback scenario, in declaration order
pub fn cases() -> Vec<Arc<dyn TestCase>> {
    let cases: [Arc<dyn TestCase>; 3] = [
        Arc::new(ListenerRoundTrip),
        Arc::new(PollUntilArchived),
        Arc::new(ValidationFanOut::default()),
    ];
    cases.into()
}
