//! Runtime variable and constant state
//!
//! Tracks deploy-time variable values from flags, prompts and `setVariable`
//! captures, and builds the template maps for both phases.

use std::collections::BTreeMap;

use crate::error::{CoreError, Result};
use crate::schema::{Constant, SetVariable, Variable, VariableType};
use crate::state::PackageState;
use crate::template::{TemplateMap, TemplateValue};

/// A resolved variable value with its presentation attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetVariableValue {
    pub value: String,
    pub sensitive: bool,
    pub auto_indent: bool,
}

/// Mutable variable state for one package operation
#[derive(Debug, Clone, Default)]
pub struct VariableConfig {
    constants: Vec<Constant>,
    set_variables: BTreeMap<String, SetVariableValue>,
}

impl VariableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the package's constants for templating
    pub fn set_constants(&mut self, constants: &[Constant]) {
        self.constants = constants.to_vec();
    }

    /// Resolve every package variable from overrides, defaults and an
    /// optional prompt callback (invoked for promptable variables with no
    /// supplied value).
    pub fn populate_variables<F>(
        &mut self,
        definitions: &[Variable],
        overrides: &BTreeMap<String, String>,
        mut prompt: F,
    ) -> Result<()>
    where
        F: FnMut(&Variable) -> Result<String>,
    {
        for definition in definitions {
            let supplied = overrides.get(&definition.name).cloned();

            let value = match supplied {
                Some(v) => Some(v),
                None if definition.prompt => Some(prompt(definition)?),
                None => definition.default.clone(),
            };

            let Some(raw) = value else {
                continue;
            };

            let value = match definition.kind {
                VariableType::Raw => raw,
                VariableType::File => std::fs::read_to_string(&raw).map_err(|e| {
                    CoreError::validation(
                        format!("variables.{}", definition.name),
                        format!("unable to read file-type variable from {raw:?}: {e}"),
                    )
                })?,
            };

            self.set_variables.insert(
                definition.name.clone(),
                SetVariableValue {
                    value,
                    sensitive: definition.sensitive,
                    auto_indent: definition.auto_indent,
                },
            );
        }
        Ok(())
    }

    /// Capture an action's output into a variable
    pub fn set_variable(&mut self, declaration: &SetVariable, value: impl Into<String>) {
        self.set_variables.insert(
            declaration.name.clone(),
            SetVariableValue {
                value: value.into(),
                sensitive: declaration.sensitive,
                auto_indent: declaration.auto_indent,
            },
        );
    }

    /// Look up a captured or populated variable
    pub fn get(&self, name: &str) -> Option<&SetVariableValue> {
        self.set_variables.get(name)
    }

    /// All current variables, for action environment injection
    pub fn all(&self) -> &BTreeMap<String, SetVariableValue> {
        &self.set_variables
    }

    /// Build the deploy-phase template map: variables, constants and the
    /// well-known in-cluster service tokens derived from state.
    pub fn deploy_templates(&self, state: &PackageState) -> TemplateMap {
        let mut map = TemplateMap::new();

        for (name, v) in &self.set_variables {
            map.insert_variable(
                name,
                TemplateValue {
                    value: v.value.clone(),
                    sensitive: v.sensitive,
                    auto_indent: v.auto_indent,
                },
            );
        }

        for constant in &self.constants {
            map.insert_constant(&constant.name, &constant.value);
        }

        map.insert(
            "###ZARF_REGISTRY###",
            TemplateValue::plain(&state.registry_info.address),
        );
        map.insert(
            "###ZARF_REGISTRY_AUTH_PUSH###",
            TemplateValue {
                value: state.registry_info.push_password.clone(),
                sensitive: true,
                ..Default::default()
            },
        );
        map.insert(
            "###ZARF_REGISTRY_AUTH_PULL###",
            TemplateValue {
                value: state.registry_info.pull_password.clone(),
                sensitive: true,
                ..Default::default()
            },
        );
        map.insert(
            "###ZARF_GIT_PUSH###",
            TemplateValue::plain(&state.git_server.push_username),
        );
        map.insert(
            "###ZARF_GIT_PULL###",
            TemplateValue::plain(&state.git_server.pull_username),
        );
        map.insert(
            "###ZARF_GIT_AUTH_PUSH###",
            TemplateValue {
                value: state.git_server.push_password.clone(),
                sensitive: true,
                ..Default::default()
            },
        );
        map.insert(
            "###ZARF_GIT_AUTH_PULL###",
            TemplateValue {
                value: state.git_server.pull_password.clone(),
                sensitive: true,
                ..Default::default()
            },
        );
        map.insert(
            "###ZARF_STORAGE_CLASS###",
            TemplateValue::plain(&state.storage_class),
        );
        map.insert(
            "###ZARF_ARCHITECTURE###",
            TemplateValue::plain(&state.architecture),
        );
        map.insert(
            crate::template::DATA_INJECTION_MARKER,
            TemplateValue::plain(crate::template::DATA_INJECTION_MARKER_FILE),
        );

        map
    }

    /// Build the create-phase template map from resolved package templates
    pub fn create_templates(values: &BTreeMap<String, String>) -> TemplateMap {
        let mut map = TemplateMap::new();
        for (name, value) in values {
            map.insert_package_template(name, value);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{GitServerInfo, RegistryInfo};

    fn no_prompt(v: &Variable) -> Result<String> {
        Err(CoreError::validation(
            format!("variables.{}", v.name),
            "prompting disabled in tests",
        ))
    }

    #[test]
    fn overrides_beat_defaults() {
        let mut config = VariableConfig::new();
        let defs = vec![Variable {
            name: "DOMAIN".to_string(),
            default: Some("default.example".to_string()),
            ..Default::default()
        }];
        let mut overrides = BTreeMap::new();
        overrides.insert("DOMAIN".to_string(), "override.example".to_string());

        config.populate_variables(&defs, &overrides, no_prompt).unwrap();
        assert_eq!(config.get("DOMAIN").unwrap().value, "override.example");
    }

    #[test]
    fn defaults_apply_without_prompt() {
        let mut config = VariableConfig::new();
        let defs = vec![Variable {
            name: "REPLICAS".to_string(),
            default: Some("3".to_string()),
            ..Default::default()
        }];

        config
            .populate_variables(&defs, &BTreeMap::new(), no_prompt)
            .unwrap();
        assert_eq!(config.get("REPLICAS").unwrap().value, "3");
    }

    #[test]
    fn promptable_variable_invokes_callback() {
        let mut config = VariableConfig::new();
        let defs = vec![Variable {
            name: "PASSWORD".to_string(),
            prompt: true,
            sensitive: true,
            ..Default::default()
        }];

        config
            .populate_variables(&defs, &BTreeMap::new(), |_| Ok("hunter2".to_string()))
            .unwrap();
        let v = config.get("PASSWORD").unwrap();
        assert_eq!(v.value, "hunter2");
        assert!(v.sensitive);
    }

    #[test]
    fn deploy_templates_carry_well_known_tokens() {
        let mut config = VariableConfig::new();
        config.set_variable(
            &SetVariable {
                name: "APP".to_string(),
                ..Default::default()
            },
            "podinfo",
        );

        let state = PackageState {
            storage_class: "local-path".to_string(),
            registry_info: RegistryInfo {
                address: "127.0.0.1:31999".to_string(),
                ..Default::default()
            },
            git_server: GitServerInfo {
                push_username: "zarf-git-user".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let map = config.deploy_templates(&state);
        let out = map.apply(
            "reg=###ZARF_REGISTRY### git=###ZARF_GIT_PUSH### sc=###ZARF_STORAGE_CLASS### app=###ZARF_VAR_APP###",
        );
        assert_eq!(
            out,
            "reg=127.0.0.1:31999 git=zarf-git-user sc=local-path app=podinfo"
        );
    }
}
