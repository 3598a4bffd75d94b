//! Deprecation migrations
//!
//! Each migration is a pure function from a component to a rewritten
//! component plus warnings. The pipeline order is fixed; the names of the
//! migrations that fired are recorded in the package build data.

use super::{Action, ActionDefaults, Component, SetVariable};

/// Name recorded in build data for the scripts migration
pub const SCRIPTS_TO_ACTIONS: &str = "scripts-to-actions";

/// Name recorded in build data for the setVariable migration
pub const PLURALIZE_SET_VARIABLE: &str = "pluralize-set-variable";

/// Run every migration against a component, in pipeline order
pub fn migrate_component(component: Component) -> (Component, Vec<String>) {
    let mut warnings = Vec::new();

    let (component, w) = scripts_to_actions(component);
    warnings.extend(w);

    let (component, w) = pluralize_set_variable(component);
    warnings.extend(w);

    (component, warnings)
}

/// All migration names, in pipeline order
pub fn all_migration_names() -> Vec<String> {
    vec![
        SCRIPTS_TO_ACTIONS.to_string(),
        PLURALIZE_SET_VARIABLE.to_string(),
    ]
}

/// Convert the legacy `scripts` hook lists into onDeploy actions
fn scripts_to_actions(mut component: Component) -> (Component, Vec<String>) {
    let Some(scripts) = component.scripts.take() else {
        return (component, Vec::new());
    };

    let warnings = vec![format!(
        "component {:?} uses deprecated scripts, converting to actions",
        component.name
    )];

    let retries = if scripts.retry { u32::MAX } else { 0 };
    let to_action = |cmd: &String| Action {
        cmd: Some(cmd.clone()),
        mute: Some(!scripts.show_output),
        max_total_seconds: scripts.timeout_seconds,
        max_retries: Some(retries),
        ..Default::default()
    };

    let on_deploy = &mut component.actions.on_deploy;
    on_deploy.defaults = ActionDefaults {
        max_total_seconds: scripts.timeout_seconds,
        max_retries: retries,
        ..Default::default()
    };
    on_deploy.before.extend(scripts.before.iter().map(to_action));
    on_deploy.after.extend(scripts.after.iter().map(to_action));

    (component, warnings)
}

/// Fold the deprecated singular `setVariable` into `setVariables`
fn pluralize_set_variable(mut component: Component) -> (Component, Vec<String>) {
    let mut warnings = Vec::new();

    for set in [
        &mut component.actions.on_create,
        &mut component.actions.on_deploy,
        &mut component.actions.on_remove,
    ] {
        for action in set
            .before
            .iter_mut()
            .chain(set.after.iter_mut())
            .chain(set.on_success.iter_mut())
            .chain(set.on_failure.iter_mut())
        {
            if let Some(name) = action.set_variable.take() {
                warnings.push(format!(
                    "action {:?} uses deprecated setVariable, converting to setVariables",
                    action.cmd.as_deref().unwrap_or_default()
                ));
                action.set_variables.push(SetVariable {
                    name,
                    ..Default::default()
                });
            }
        }
    }

    (component, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DeprecatedScripts;

    #[test]
    fn scripts_become_deploy_actions() {
        let component = Component {
            name: "legacy".to_string(),
            scripts: Some(DeprecatedScripts {
                before: vec!["echo hello".to_string()],
                after: vec!["echo done".to_string()],
                show_output: true,
                ..Default::default()
            }),
            ..Default::default()
        };

        let (migrated, warnings) = migrate_component(component);
        assert!(migrated.scripts.is_none());
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            migrated.actions.on_deploy.before[0].cmd.as_deref(),
            Some("echo hello")
        );
        assert_eq!(migrated.actions.on_deploy.before[0].mute, Some(false));
        assert_eq!(
            migrated.actions.on_deploy.after[0].cmd.as_deref(),
            Some("echo done")
        );
    }

    #[test]
    fn singular_set_variable_is_pluralized() {
        let mut component = Component {
            name: "legacy".to_string(),
            ..Default::default()
        };
        component.actions.on_deploy.after.push(Action {
            cmd: Some("cat version.txt".to_string()),
            set_variable: Some("APP_VERSION".to_string()),
            ..Default::default()
        });

        let (migrated, warnings) = migrate_component(component);
        let action = &migrated.actions.on_deploy.after[0];
        assert!(action.set_variable.is_none());
        assert_eq!(action.set_variables[0].name, "APP_VERSION");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn clean_component_is_untouched() {
        let component = Component {
            name: "modern".to_string(),
            ..Default::default()
        };
        let (migrated, warnings) = migrate_component(component.clone());
        assert!(warnings.is_empty());
        assert_eq!(
            serde_yaml::to_string(&migrated).unwrap(),
            serde_yaml::to_string(&component).unwrap()
        );
    }
}
