use crate::types::{KillEvent, LabelSet, PodRecord};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Point-in-time listing of the pods scheduled on a node.
pub trait PodSource {
    fn list_pods(
        &self,
        node_name: &str,
    ) -> impl Future<Output = anyhow::Result<Vec<PodRecord>>> + Send;
}

/// [`PodSource`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubePodSource {
    client: Client,
}

impl KubePodSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl PodSource for KubePodSource {
    async fn list_pods(&self, node_name: &str) -> anyhow::Result<Vec<PodRecord>> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let lp = ListParams::default().fields(&format!("spec.nodeName={}", node_name));
        let pods = api.list(&lp).await?;
        Ok(pods.items.iter().map(pod_record).collect())
    }
}

/// Flatten a pod object into the fields needed for labelling a kill.
pub fn pod_record(pod: &Pod) -> PodRecord {
    let status = pod.status.as_ref();
    let statuses = status
        .and_then(|s| s.container_statuses.as_ref())
        .into_iter()
        .chain(status.and_then(|s| s.init_container_statuses.as_ref()))
        .flatten();

    PodRecord {
        uid: pod.uid().unwrap_or_default(),
        name: pod.name_any(),
        namespace: pod.namespace().unwrap_or_default(),
        unit: pod.labels().get("unit").cloned(),
        containers: statuses
            .filter_map(|cs| cs.container_id.as_ref().map(|id| (cs.name.clone(), id.clone())))
            .collect(),
    }
}

/// Build the exported label set for a kill inside `pod`.
///
/// Runtime ids carry a scheme prefix (`containerd://`, `docker://`), so the
/// container is matched by substring. No match leaves `container_name` empty.
pub fn pod_labels(pod: &PodRecord, event: &KillEvent, node_name: &str) -> LabelSet {
    let container_name = pod
        .containers
        .iter()
        .find(|(_, id)| id.contains(&event.container_id))
        .map(|(name, _)| name.clone())
        .unwrap_or_default();

    LabelSet::from([
        ("pod_name".to_string(), pod.name.clone()),
        ("node_name".to_string(), node_name.to_string()),
        ("namespace".to_string(), pod.namespace.clone()),
        ("container_name".to_string(), container_name),
        ("pod_uuid".to_string(), pod.uid.clone()),
        ("unit".to_string(), pod.unit.clone().unwrap_or_default()),
    ])
}

/// Maps kill events to pod labels with one bounded pod listing per event.
pub struct Resolver<S> {
    source: S,
    timeout: Duration,
}

impl<S: PodSource> Resolver<S> {
    pub fn new(source: S, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Resolve `event` against the pods currently on `node_name`.
    ///
    /// Query failures, timeouts and unknown pods all yield `None`.
    pub async fn resolve(&self, event: &KillEvent, node_name: &str) -> Option<LabelSet> {
        let pods = match tokio::time::timeout(self.timeout, self.source.list_pods(node_name)).await
        {
            Ok(Ok(pods)) => pods,
            Ok(Err(e)) => {
                info!(
                    "[{}] Failed to list pods while resolving {}: {:#}",
                    node_name, event.pod_uid, e
                );
                return None;
            }
            Err(_) => {
                info!(
                    "[{}] Pod listing timed out after {:?} while resolving {}",
                    node_name, self.timeout, event.pod_uid
                );
                return None;
            }
        };

        let Some(pod) = pods.iter().find(|p| p.uid == event.pod_uid) else {
            debug!(
                "[{}] No pod with uid {} among {} pods, it may already be gone",
                node_name,
                event.pod_uid,
                pods.len()
            );
            return None;
        };

        let labels = pod_labels(pod, event, node_name);
        debug!(
            "[{}] Resolved {}/{} to {}/{} container '{}'",
            node_name,
            event.pod_uid,
            event.container_id,
            pod.namespace,
            pod.name,
            labels["container_name"]
        );
        Some(labels)
    }
}
