//! Desired resources.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::plan::stage::Stage;
use crate::release::DeployType;

use super::meta::ResourceMeta;
use super::policy::{HookPhase, ResourcePolicy};

/// A resource identity together with its full desired object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Identity and metadata.
    pub meta: ResourceMeta,
    /// The full unstructured object to send to the cluster.
    pub object: serde_json::Value,
}

impl ResourceSpec {
    /// Builds a spec from an unstructured object.
    ///
    /// The namespace is written back into the object so the cluster sees the
    /// same identity the plan uses.
    ///
    /// # Errors
    ///
    /// Returns an error if the object lacks identity fields.
    pub fn from_object(
        mut object: serde_json::Value,
        default_namespace: &str,
        file_path: &str,
    ) -> Result<Self, ConfigError> {
        let meta = ResourceMeta::from_object(&object, default_namespace, file_path)?;

        if !meta.namespace.is_empty()
            && let Some(metadata) = object
                .get_mut("metadata")
                .and_then(serde_json::Value::as_object_mut)
        {
            metadata.insert(
                String::from("namespace"),
                serde_json::Value::String(meta.namespace.clone()),
            );
        }

        Ok(Self { meta, object })
    }
}

/// A desired resource: its spec plus the policy read from its annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// What to deploy.
    pub spec: ResourceSpec,
    /// How to deploy it.
    pub policy: ResourcePolicy,
}

impl Resource {
    /// Parses a desired resource from an unstructured object.
    ///
    /// # Errors
    ///
    /// Returns an error on missing identity fields or invalid annotations.
    pub fn from_object(
        object: serde_json::Value,
        release_namespace: &str,
        file_path: &str,
    ) -> Result<Self, ConfigError> {
        let spec = ResourceSpec::from_object(object, release_namespace, file_path)?;
        let policy = ResourcePolicy::from_annotations(
            &spec.meta.annotations,
            &spec.meta.namespace,
            &spec.meta.id_human(),
        )?;
        Ok(Self { spec, policy })
    }

    /// Identity of the resource.
    #[must_use]
    pub const fn meta(&self) -> &ResourceMeta {
        &self.spec.meta
    }

    /// Stages this resource is deployed in for a deploy type.
    ///
    /// Hooks land in the pre- and/or post-hooks stage of matching phases and
    /// may therefore appear twice. Regular resources are not deployed during
    /// an uninstall.
    #[must_use]
    pub fn stages(&self, deploy_type: DeployType) -> Vec<Stage> {
        if self.policy.is_hook() {
            let (pre, post) = hook_phases(deploy_type);
            let mut stages = Vec::new();
            if self.policy.hooks.contains(&pre) {
                stages.push(Stage::PreHooks);
            }
            if self.policy.hooks.contains(&post) {
                stages.push(Stage::PostHooks);
            }
            return stages;
        }

        match deploy_type {
            DeployType::Uninstall => Vec::new(),
            _ if self.spec.meta.gvk.is_crd() => vec![Stage::StandaloneDefinitions],
            _ => vec![Stage::Resources],
        }
    }
}

const fn hook_phases(deploy_type: DeployType) -> (HookPhase, HookPhase) {
    match deploy_type {
        DeployType::Install => (HookPhase::PreInstall, HookPhase::PostInstall),
        DeployType::Upgrade => (HookPhase::PreUpgrade, HookPhase::PostUpgrade),
        DeployType::Rollback => (HookPhase::PreRollback, HookPhase::PostRollback),
        DeployType::Uninstall => (HookPhase::PreDelete, HookPhase::PostDelete),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(hooks: &str) -> Resource {
        Resource::from_object(
            json!({
                "apiVersion": "batch/v1",
                "kind": "Job",
                "metadata": {
                    "name": "migrate",
                    "annotations": {"rollplan.io/hook": hooks}
                }
            }),
            "prod",
            "templates/job.yaml",
        )
        .expect("valid resource")
    }

    #[test]
    fn test_namespace_written_into_object() {
        let spec = ResourceSpec::from_object(
            json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "cm"}}),
            "prod",
            "",
        )
        .expect("valid");

        assert_eq!(spec.object["metadata"]["namespace"], "prod");
    }

    #[test]
    fn test_regular_resource_stages() {
        let cm = Resource::from_object(
            json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "cm"}}),
            "prod",
            "",
        )
        .expect("valid");

        assert_eq!(cm.stages(DeployType::Upgrade), vec![Stage::Resources]);
        assert!(cm.stages(DeployType::Uninstall).is_empty());
    }

    #[test]
    fn test_crd_goes_to_standalone_definitions() {
        let crd = Resource::from_object(
            json!({
                "apiVersion": "apiextensions.k8s.io/v1",
                "kind": "CustomResourceDefinition",
                "metadata": {"name": "widgets.example.com"}
            }),
            "prod",
            "",
        )
        .expect("valid");

        assert_eq!(crd.stages(DeployType::Install), vec![Stage::StandaloneDefinitions]);
    }

    #[test]
    fn test_hook_stages_follow_deploy_type() {
        let hook = job("pre-install,post-install,pre-delete");

        assert_eq!(
            hook.stages(DeployType::Install),
            vec![Stage::PreHooks, Stage::PostHooks]
        );
        assert!(hook.stages(DeployType::Upgrade).is_empty());
        assert_eq!(hook.stages(DeployType::Uninstall), vec![Stage::PreHooks]);
    }
}
