//! Manifest apply and delete
//!
//! Applies raw Kubernetes manifests with Server-Side Apply and deletes them
//! in reverse document order, discovering each kind's API dynamically so
//! CRDs installed earlier in a deploy are usable by later manifests.

use serde::Deserialize;

use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::discovery::{ApiCapabilities, ApiResource, Discovery, Scope};
use kube::Client;

use crate::error::{KubeError, Result};

/// Field manager name for Server-Side Apply
const FIELD_MANAGER: &str = "zarf";

/// Applies and deletes dynamic resources
pub struct ResourceManager {
    client: Client,
    discovery: Discovery,
}

impl ResourceManager {
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self { client, discovery })
    }

    /// Re-run discovery; needed after manifests install new CRDs
    pub async fn refresh(&mut self) -> Result<()> {
        self.discovery = Discovery::new(self.client.clone()).run().await?;
        Ok(())
    }

    /// Apply every document of a multi-doc YAML manifest in order.
    ///
    /// Returns the display names of the applied resources.
    pub async fn apply_manifest(
        &self,
        default_namespace: &str,
        manifest: &str,
    ) -> Result<Vec<String>> {
        let mut applied = Vec::new();

        for object in parse_documents(manifest)? {
            let (api, display_name) = self.api_for(&object, default_namespace)?;
            tracing::debug!(resource = %display_name, "applying resource");

            api.patch(
                object.metadata.name.as_deref().unwrap_or_default(),
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&object),
            )
            .await?;
            applied.push(display_name);
        }

        Ok(applied)
    }

    /// Delete every document of a manifest in reverse order, tolerating
    /// already-gone resources.
    pub async fn delete_manifest(
        &self,
        default_namespace: &str,
        manifest: &str,
    ) -> Result<Vec<String>> {
        let mut deleted = Vec::new();

        for object in parse_documents(manifest)?.into_iter().rev() {
            let (api, display_name) = self.api_for(&object, default_namespace)?;
            tracing::debug!(resource = %display_name, "deleting resource");

            match api
                .delete(
                    object.metadata.name.as_deref().unwrap_or_default(),
                    &DeleteParams::default(),
                )
                .await
            {
                Ok(_) => deleted.push(display_name),
                Err(kube::Error::Api(e)) if e.code == 404 => {
                    tracing::warn!(resource = %display_name, "resource already deleted");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(deleted)
    }

    fn api_for(
        &self,
        object: &DynamicObject,
        default_namespace: &str,
    ) -> Result<(Api<DynamicObject>, String)> {
        let type_meta = object.types.as_ref().ok_or_else(|| {
            KubeError::Manifest("manifest document has no apiVersion/kind".to_string())
        })?;

        let gvk = GroupVersionKind::try_from(type_meta)
            .map_err(|e| KubeError::Manifest(e.to_string()))?;

        let (resource, capabilities): (ApiResource, ApiCapabilities) = self
            .discovery
            .resolve_gvk(&gvk)
            .ok_or_else(|| KubeError::UnknownKind {
                group: gvk.group.clone(),
                version: gvk.version.clone(),
                kind: gvk.kind.clone(),
            })?;

        let name = object.metadata.name.as_deref().unwrap_or("unnamed");
        let api = if capabilities.scope == Scope::Namespaced {
            let namespace = object
                .metadata
                .namespace
                .as_deref()
                .unwrap_or(default_namespace);
            (
                Api::namespaced_with(self.client.clone(), namespace, &resource),
                format!("{namespace}/{}/{name}", gvk.kind),
            )
        } else {
            (
                Api::all_with(self.client.clone(), &resource),
                format!("{}/{name}", gvk.kind),
            )
        };

        Ok(api)
    }
}

/// Split a multi-document YAML string into dynamic objects, skipping empty
/// documents.
pub fn parse_documents(manifest: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();

    for document in serde_yaml::Deserializer::from_str(manifest) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| KubeError::Manifest(e.to_string()))?;
        if value.is_null() {
            continue;
        }
        let object: DynamicObject =
            serde_yaml::from_value(value).map_err(|e| KubeError::Manifest(e.to_string()))?;
        objects.push(object);
    }

    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multi_document_manifests() {
        let manifest = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: first
---
---
apiVersion: v1
kind: Secret
metadata:
  name: second
  namespace: custom
"#;
        let objects = parse_documents(manifest).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].metadata.name.as_deref(), Some("first"));
        assert_eq!(objects[1].metadata.namespace.as_deref(), Some("custom"));
    }

    #[test]
    fn rejects_untyped_documents() {
        let manifest = "metadata:\n  name: no-kind\n";
        // Parses as a dynamic object but carries no type information; the
        // apply path rejects it when resolving the API.
        let objects = parse_documents(manifest).unwrap();
        assert!(objects[0].types.is_none() || objects[0].types.as_ref().unwrap().kind.is_empty());
    }
}
