//! Per-task resource requests and pipeline-wide overrides

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Resource request for one task, in the shape an LSF-style scheduler expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub queue: String,
    /// Memory ceiling in KB
    pub memory_limit_kb: u64,
    /// Host selection / reservation string (`select[...] rusage[...]`)
    pub resource_request: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub notify_on_finish: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image: Option<String>,
}

impl ResourceSpec {
    /// Stage template: queue, memory ceiling and selection string
    pub fn new(queue: impl Into<String>, memory_limit_kb: u64, resource_request: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            memory_limit_kb,
            resource_request: resource_request.into(),
            cpus: None,
            job_group: None,
            email: None,
            notify_on_finish: true,
            container_image: None,
        }
    }

    pub fn with_cpus(mut self, cpus: u32) -> Self {
        self.cpus = Some(cpus);
        self
    }

    /// The `long` queue with 8 GB, used by most per-chromosome stages
    pub fn long_8g() -> Self {
        Self::new("long", 8_000_000, "select[mem>8000] rusage[mem=8000]")
    }

    /// Render as the flag map handed to the execution engine
    pub fn to_drm_params(&self) -> Value {
        let mut params = Map::new();
        params.insert("q".into(), Value::from(self.queue.as_str()));
        params.insert("M".into(), Value::from(self.memory_limit_kb));
        params.insert("R".into(), Value::from(self.resource_request.as_str()));
        if let Some(cpus) = self.cpus {
            params.insert("n".into(), Value::from(cpus));
        }
        if let Some(group) = &self.job_group {
            params.insert("g".into(), Value::from(group.as_str()));
        }
        if let Some(email) = &self.email {
            params.insert("u".into(), Value::from(email.as_str()));
        }
        if self.notify_on_finish {
            params.insert("N".into(), Value::Null);
        }
        if let Some(image) = &self.container_image {
            params.insert("a".into(), Value::from(format!("'docker({})'", image)));
        }
        Value::Object(params)
    }
}

/// Replacement envelope applied when tasks run inside a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerProfile {
    pub image: String,
    pub queue: String,
    pub memory_limit_kb: u64,
    pub resource_request: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,
}

impl Default for ContainerProfile {
    fn default() -> Self {
        Self {
            image: "registry.gsc.wustl.edu/genome/genome_perl_environment:23".to_string(),
            queue: "research-hpc".to_string(),
            memory_limit_kb: 16_000_000,
            resource_request: "select[mem>10000 && ncpus>8] rusage[mem=16000]".to_string(),
            cpus: None,
        }
    }
}

/// Pipeline-wide inputs to resource resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceContext {
    pub email: Option<String>,
    pub job_group: Option<String>,
    /// Set when tasks should run under a container on an alternate queue
    pub container: Option<ContainerProfile>,
}

/// Merge a stage template with the pipeline-wide context
///
/// Pure: identical inputs always produce identical output, which keeps
/// rebuilt graphs identical across restarts.
pub fn resolve(base: &ResourceSpec, ctx: &ResourceContext) -> ResourceSpec {
    let mut spec = base.clone();

    if spec.email.is_none() {
        spec.email = ctx.email.clone();
    }
    if spec.job_group.is_none() {
        spec.job_group = ctx.job_group.clone();
    }

    if let Some(profile) = &ctx.container {
        if spec.queue != profile.queue {
            spec.queue = profile.queue.clone();
            spec.memory_limit_kb = profile.memory_limit_kb;
            spec.resource_request = profile.resource_request.clone();
            spec.cpus = profile.cpus;
            spec.container_image = Some(profile.image.clone());
        }
    }

    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(container: bool) -> ResourceContext {
        ResourceContext {
            email: Some("someone@example.org".to_string()),
            job_group: None,
            container: container.then(ContainerProfile::default),
        }
    }

    #[test]
    fn injects_email_without_override() {
        let spec = resolve(&ResourceSpec::long_8g(), &ctx(false));
        assert_eq!(spec.queue, "long");
        assert_eq!(spec.memory_limit_kb, 8_000_000);
        assert_eq!(spec.email.as_deref(), Some("someone@example.org"));
        assert!(spec.container_image.is_none());
    }

    #[test]
    fn container_override_replaces_envelope() {
        let base = ResourceSpec::long_8g().with_cpus(2);
        let spec = resolve(&base, &ctx(true));
        assert_eq!(spec.queue, "research-hpc");
        assert_eq!(spec.memory_limit_kb, 16_000_000);
        assert_eq!(spec.resource_request, "select[mem>10000 && ncpus>8] rusage[mem=16000]");
        assert_eq!(spec.cpus, None);
        assert!(spec.container_image.is_some());
    }

    #[test]
    fn override_skipped_when_already_on_override_queue() {
        let base = ResourceSpec::new("research-hpc", 4_000_000, "rusage[mem=4000]");
        let spec = resolve(&base, &ctx(true));
        assert_eq!(spec.memory_limit_kb, 4_000_000);
        assert!(spec.container_image.is_none());
    }

    #[test]
    fn resolution_is_deterministic() {
        let base = ResourceSpec::long_8g();
        assert_eq!(resolve(&base, &ctx(true)), resolve(&base, &ctx(true)));
    }

    #[test]
    fn template_fields_win_over_context() {
        let mut base = ResourceSpec::long_8g();
        base.job_group = Some("/me/realign".to_string());
        let context = ResourceContext {
            job_group: Some("/me/default".to_string()),
            ..ResourceContext::default()
        };
        assert_eq!(resolve(&base, &context).job_group.as_deref(), Some("/me/realign"));
    }

    #[test]
    fn drm_params_render() {
        let spec = resolve(&ResourceSpec::long_8g(), &ctx(true));
        assert_eq!(
            spec.to_drm_params(),
            json!({
                "q": "research-hpc",
                "M": 16_000_000,
                "R": "select[mem>10000 && ncpus>8] rusage[mem=16000]",
                "u": "someone@example.org",
                "N": null,
                "a": "'docker(registry.gsc.wustl.edu/genome/genome_perl_environment:23)'",
            })
        );
    }
}
