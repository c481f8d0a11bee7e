use crate::domain::PublishService;
use common::domain::{ContentId, PublishRecord, PublishTarget};
use relay_runner::AppProcess;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct PublisherConfig {
    pub target: PublishTarget,
    /// Publish every `interval`; `None` publishes once and stops
    pub interval: Option<Duration>,
    /// Public gateway used to build the link shown to the operator
    pub gateway_url: String,
}

pub struct Publisher {
    service: Arc<PublishService>,
    config: PublisherConfig,
}

impl Publisher {
    pub fn new(service: Arc<PublishService>, config: PublisherConfig) -> Self {
        Self { service, config }
    }

    pub fn gateway_link(&self, cid: &ContentId) -> String {
        format!("{}/ipfs/{}", self.config.gateway_url.trim_end_matches('/'), cid)
    }

    /// Publish the configured target once and print the identifier
    pub async fn run_once(&self) -> anyhow::Result<PublishRecord> {
        let record = self.service.publish(&self.config.target).await?;

        println!("CID: {}", record.cid);
        println!("Gateway URL: {}", self.gateway_link(&record.cid));
        info!(
            cid = %record.cid,
            target = %record.target,
            gateway_url = %self.gateway_link(&record.cid),
            "publish complete"
        );
        Ok(record)
    }

    /// Publish on every tick until cancelled; a failed publish waits for the next tick
    pub async fn run_periodic(&self, interval: Duration, ctx: CancellationToken) -> anyhow::Result<()> {
        info!(interval = ?interval, target = %self.config.target, "periodic publisher started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("periodic publisher stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %format!("{e:#}"), "publish failed, retrying at next tick");
                    }
                }
            }
        }
    }

    pub fn into_runner_process(self) -> AppProcess {
        Box::new(move |ctx| {
            Box::pin(async move {
                match self.config.interval {
                    Some(interval) => self.run_periodic(interval, ctx).await,
                    None => {
                        // Shutdown abandons a publish in flight.
                        tokio::select! {
                            _ = ctx.cancelled() => Ok(()),
                            result = self.run_once() => result.map(|_| ()),
                        }
                    }
                }
            })
        })
    }
}
