use crate::extract::extract;
use crate::kubernetes::{PodSource, Resolver};
use crate::metrics::Aggregator;
use futures::{Stream, TryStreamExt};
use std::sync::Arc;
use tracing::{info, warn};

/// What happened to one kernel log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not an OOM kill line
    NoMatch,
    /// OOM kill, but no pod on this node owns it (or the lookup failed)
    Unresolved,
    /// Counted; carries the new total for its label set
    Recorded(u64),
    /// Labels were refused by the aggregator
    Rejected,
}

/// Drives kernel log lines through extraction, resolution and counting.
pub struct Pipeline<S> {
    resolver: Resolver<S>,
    aggregator: Arc<Aggregator>,
    node_name: String,
}

impl<S: PodSource> Pipeline<S> {
    pub fn new(resolver: Resolver<S>, aggregator: Arc<Aggregator>, node_name: String) -> Self {
        Self {
            resolver,
            aggregator,
            node_name,
        }
    }

    pub async fn process_line(&self, line: &str) -> Outcome {
        let Some(event) = extract(line) else {
            return Outcome::NoMatch;
        };
        info!(
            "[{}] OOM KILL: pod {} | container {}",
            self.node_name, event.pod_uid, event.container_id
        );

        let Some(labels) = self.resolver.resolve(&event, &self.node_name).await else {
            return Outcome::Unresolved;
        };

        match self.aggregator.record(&labels) {
            Ok(count) => {
                info!(
                    "[{}] Counted OOM kill for {}/{} container '{}' (total {})",
                    self.node_name,
                    labels["namespace"],
                    labels["pod_name"],
                    labels["container_name"],
                    count
                );
                Outcome::Recorded(count)
            }
            Err(e) => {
                warn!("[{}] Dropping OOM kill: {}", self.node_name, e);
                Outcome::Rejected
            }
        }
    }

    /// Consume `lines` until the stream ends. A stream error is returned as is.
    pub async fn run<L>(&self, mut lines: L) -> anyhow::Result<()>
    where
        L: Stream<Item = anyhow::Result<String>> + Unpin,
    {
        while let Some(line) = lines.try_next().await? {
            self.process_line(&line).await;
        }
        info!("[{}] Kernel log stream ended", self.node_name);
        Ok(())
    }
}
