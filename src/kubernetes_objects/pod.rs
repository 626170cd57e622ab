use std::collections::{BTreeMap, HashSet};

use k8s_openapi::api::core::v1::Pod;

use super::JOB_NAME_LABEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// A pod without a reported phase has not been scheduled yet.
    pub(crate) fn of(pod: &Pod) -> PodPhase {
        match pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
            None | Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            Some(_) => PodPhase::Unknown,
        }
    }
}

/// Completion state of a single container as seen through its pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ContainerCompletion {
    NotCompleted,
    Succeeded,
    Failed(String),
}

pub(crate) fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}

pub(crate) fn includes_container(pod: &Pod, container: &str) -> bool {
    pod.spec
        .as_ref()
        .is_some_and(|spec| spec.containers.iter().any(|c| c.name == container))
}

pub(crate) fn container_completion(pod: &Pod, container: &str) -> ContainerCompletion {
    match PodPhase::of(pod) {
        PodPhase::Succeeded => return ContainerCompletion::Succeeded,
        PodPhase::Failed => {
            return ContainerCompletion::Failed(format!("Pod '{}' is failed", pod_name(pod)));
        }
        PodPhase::Pending => return ContainerCompletion::NotCompleted,
        PodPhase::Running | PodPhase::Unknown => {}
    }

    let terminated = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| statuses.iter().find(|s| s.name == container))
        .and_then(|s| s.state.as_ref())
        .and_then(|state| state.terminated.as_ref());

    match terminated {
        Some(t) if t.exit_code == 0 => ContainerCompletion::Succeeded,
        Some(t) => ContainerCompletion::Failed(format!(
            "Container '{}' in pod '{}' exited with code {} ({})",
            container,
            pod_name(pod),
            t.exit_code,
            t.reason.as_deref().unwrap_or("no reason")
        )),
        None => ContainerCompletion::NotCompleted,
    }
}

/// Builds a `key=value,...` selector. Ordered by key since labels are a BTreeMap.
pub(crate) fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn job_name_selector(job_name: &str) -> String {
    format!("{JOB_NAME_LABEL}={job_name}")
}

/// Pods in `current` whose name does not appear in `seen`.
pub(crate) fn diff_pods(seen: &[Pod], current: &[Pod]) -> Vec<Pod> {
    let seen: HashSet<&str> = seen.iter().map(pod_name).collect();
    current
        .iter()
        .filter(|pod| !seen.contains(pod_name(pod)))
        .cloned()
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_label_selector_contains_every_label() {
        let labels = BTreeMap::from([
            ("app".to_string(), "job".to_string()),
            ("version".to_string(), "1".to_string()),
        ]);
        let selector = label_selector(&labels);
        let mut terms: Vec<&str> = selector.split(',').collect();
        terms.sort();
        assert_eq!(terms, vec!["app=job", "version=1"]);
    }

    #[test]
    fn test_job_name_selector() {
        assert_eq!(job_name_selector("example-abc"), "job-name=example-abc");
    }

    #[test]
    fn test_diff_pods_returns_only_new_pods() {
        let pod1 = pod("pod1", "alpine", "Running");
        let pod2 = pod("pod2", "alpine", "Running");
        let pod3 = pod("pod3", "alpine", "Pending");

        let diff = diff_pods(
            &[pod1.clone(), pod2.clone()],
            &[pod1.clone(), pod2.clone(), pod3],
        );
        assert_eq!(diff.len(), 1);
        assert_eq!(pod_name(&diff[0]), "pod3");

        assert!(diff_pods(&[pod1.clone(), pod2.clone()], &[pod1, pod2]).is_empty());
    }

    #[test]
    fn test_diff_pods_ignores_pods_that_disappeared() {
        let pod1 = pod("pod1", "alpine", "Failed");
        let pod2 = pod("pod2", "alpine", "Running");
        let diff = diff_pods(&[pod1], std::slice::from_ref(&pod2));
        assert_eq!(diff, vec![pod2]);
    }

    #[test]
    fn test_pod_phase_defaults_to_pending() {
        let mut p = pod("pod1", "alpine", "Running");
        p.status = None;
        assert_eq!(PodPhase::of(&p), PodPhase::Pending);
    }

    #[test]
    fn test_container_completion() {
        assert_eq!(
            container_completion(&pod("a", "alpine", "Succeeded"), "alpine"),
            ContainerCompletion::Succeeded
        );
        assert!(matches!(
            container_completion(&pod("a", "alpine", "Failed"), "alpine"),
            ContainerCompletion::Failed(_)
        ));
        assert_eq!(
            container_completion(&pod("a", "alpine", "Pending"), "alpine"),
            ContainerCompletion::NotCompleted
        );
        assert_eq!(
            container_completion(&running(pod("a", "alpine", "Running"), "alpine"), "alpine"),
            ContainerCompletion::NotCompleted
        );
        assert_eq!(
            container_completion(&terminated(pod("a", "alpine", "Running"), "alpine", 0), "alpine"),
            ContainerCompletion::Succeeded
        );
        assert!(matches!(
            container_completion(&terminated(pod("a", "alpine", "Running"), "alpine", 2), "alpine"),
            ContainerCompletion::Failed(_)
        ));
    }

    #[test]
    fn test_includes_container() {
        let p = pod("a", "alpine", "Running");
        assert!(includes_container(&p, "alpine"));
        assert!(!includes_container(&p, "debian"));
    }
}
