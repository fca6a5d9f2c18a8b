//! Test cases with scripted outcomes

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use harness::{Skip, TestCase, TestContext};
use shared::{ResourceId, WorkerId};

/// Passes and remembers which stream each worker ran it on
#[derive(Default)]
pub struct RecordingCase {
    pub seen: Arc<Mutex<HashMap<WorkerId, ResourceId>>>,
}

#[async_trait]
impl TestCase for RecordingCase {
    fn name(&self) -> &str {
        "tc201_binds_stream"
    }

    fn tags(&self) -> &[&'static str] {
        &["smoke"]
    }

    async fn run(&self, ctx: &mut TestContext) -> anyhow::Result<()> {
        let mut seen = self.seen.lock().unwrap();
        anyhow::ensure!(
            seen.insert(ctx.worker(), ctx.resource().clone()).is_none(),
            "worker {} ran twice",
            ctx.worker()
        );
        Ok(())
    }
}

pub struct FailingCase;

#[async_trait]
impl TestCase for FailingCase {
    fn name(&self) -> &str {
        "tc202_copy_count"
    }

    fn tags(&self) -> &[&'static str] {
        &["archive"]
    }

    async fn run(&self, ctx: &mut TestContext) -> anyhow::Result<()> {
        ctx.set_message("copy count check failed");
        anyhow::bail!("expected 2 copies on {}, found 1", ctx.resource())
    }
}

pub struct PanickingCase;

#[async_trait]
impl TestCase for PanickingCase {
    fn name(&self) -> &str {
        "tc203_validator_bug"
    }

    async fn run(&self, _ctx: &mut TestContext) -> anyhow::Result<()> {
        panic!("validator indexed past the manifest");
    }
}

pub struct SkippingCase;

#[async_trait]
impl TestCase for SkippingCase {
    fn name(&self) -> &str {
        "tc204_cold_tier"
    }

    async fn run(&self, _ctx: &mut TestContext) -> anyhow::Result<()> {
        Err(Skip::new("cold tier not provisioned").into())
    }
}

/// Opens a listener and never closes it
pub struct LeakyCase;

#[async_trait]
impl TestCase for LeakyCase {
    fn name(&self) -> &str {
        "tc205_forgets_close"
    }

    async fn run(&self, ctx: &mut TestContext) -> anyhow::Result<()> {
        let key = format!("rec-{}", ctx.resource());
        ctx.open_listener(&key).await?;
        Ok(())
    }
}
