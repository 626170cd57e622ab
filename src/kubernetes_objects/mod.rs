pub mod cluster;
pub(crate) mod pod;
pub mod template;

pub(crate) const MANAGER_NAME: &str = "kube-job";
pub(crate) const DEFAULT_NAMESPACE: &str = "default";

/// Label the job controller puts on every pod it creates.
pub(crate) const JOB_NAME_LABEL: &str = "job-name";

#[cfg(test)]
pub(crate) mod fake;
