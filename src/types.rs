use std::collections::BTreeMap;

/// Pod and container identifiers pulled out of a single kernel OOM line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillEvent {
    pub pod_uid: String,
    pub container_id: String,
}

/// Point-in-time view of one pod, as returned by a node-scoped pod listing.
#[derive(Debug, Clone, Default)]
pub struct PodRecord {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub unit: Option<String>,
    /// (container name, runtime container id) pairs, e.g. `("app", "containerd://f247...")`
    pub containers: Vec<(String, String)>,
}

/// Label name to value. Used as the aggregation key and as the exported label set.
pub type LabelSet = BTreeMap<String, String>;
