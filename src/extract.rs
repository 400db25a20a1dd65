use crate::types::KillEvent;
use regex::Regex;
use std::sync::LazyLock;

static CGROUP_V1_LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/pod(\w+-\w+-\w+-\w+-\w+)/([a-f0-9]+) killed as a result of limit of /kubepods")
        .expect("valid cgroup v1 limit pattern")
});

static MEMCG_TASK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/pod(\w+-\w+-\w+-\w+-\w+)/([a-f0-9]+),task").expect("valid memcg task pattern")
});

static SYSTEMD_SCOPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"-pod([0-9a-f]{8}_[0-9a-f]{4}_[0-9a-f]{4}_[0-9a-f]{4}_[0-9a-f]{12})\.slice/(?:[a-z-]+-)?([a-f0-9]+)\.scope",
    )
    .expect("valid systemd scope pattern")
});

/// Kernel log layouts that name the cgroup of an OOM-killed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OomGrammar {
    /// `Task in /kubepods/.../pod<uid>/<id> killed as a result of limit of /kubepods...` (pre 5.x kernels)
    CgroupV1Limit,
    /// `oom-kill:...,task_memcg=/kubepods/.../pod<uid>/<id>,task=...` (5.x kernels)
    MemcgTask,
    /// `.../kubepods-<qos>-pod<uid_with_underscores>.slice/<runtime>-<id>.scope` (systemd cgroup driver)
    SystemdScope,
}

impl OomGrammar {
    /// Grammars in the order they are tried; the first match wins.
    pub const PRIORITY: [OomGrammar; 3] = [
        OomGrammar::CgroupV1Limit,
        OomGrammar::MemcgTask,
        OomGrammar::SystemdScope,
    ];

    fn pattern(self) -> &'static Regex {
        match self {
            OomGrammar::CgroupV1Limit => &CGROUP_V1_LIMIT,
            OomGrammar::MemcgTask => &MEMCG_TASK,
            OomGrammar::SystemdScope => &SYSTEMD_SCOPE,
        }
    }

    pub fn capture(self, line: &str) -> Option<KillEvent> {
        let caps = self.pattern().captures(line)?;
        let pod_uid = match self {
            // systemd escapes the dashes of the uid inside slice names
            OomGrammar::SystemdScope => caps[1].replace('_', "-"),
            _ => caps[1].to_string(),
        };
        let container_id = caps[2].to_string();
        if pod_uid.is_empty() || container_id.is_empty() {
            return None;
        }
        Some(KillEvent {
            pod_uid,
            container_id,
        })
    }
}

/// Extract the pod uid and container id from an OOM kill line, if it is one.
pub fn extract(line: &str) -> Option<KillEvent> {
    OomGrammar::PRIORITY
        .iter()
        .find_map(|grammar| grammar.capture(line))
}

