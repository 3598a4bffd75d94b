//! Action and wait definitions
//!
//! Actions run around component lifecycle steps: shell commands or wait
//! predicates grouped into `before`/`after`/`onSuccess`/`onFailure` sets,
//! scoped to create, deploy or remove.

use serde::{Deserialize, Serialize};

/// Action sets for each lifecycle phase of a component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actions {
    #[serde(default, skip_serializing_if = "ActionSet::is_empty")]
    pub on_create: ActionSet,

    #[serde(default, skip_serializing_if = "ActionSet::is_empty")]
    pub on_deploy: ActionSet,

    #[serde(default, skip_serializing_if = "ActionSet::is_empty")]
    pub on_remove: ActionSet,
}

impl Actions {
    pub fn is_empty(&self) -> bool {
        self.on_create.is_empty() && self.on_deploy.is_empty() && self.on_remove.is_empty()
    }
}

/// Ordered action lists that bracket a lifecycle step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSet {
    /// Defaults applied to every action in this set
    #[serde(default, skip_serializing_if = "ActionDefaults::is_empty")]
    pub defaults: ActionDefaults,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<Action>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<Action>,

    /// Run once after the whole step succeeds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_success: Vec<Action>,

    /// Run once after any failure in the step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<Action>,
}

impl ActionSet {
    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
            && self.before.is_empty()
            && self.after.is_empty()
            && self.on_success.is_empty()
            && self.on_failure.is_empty()
    }

    /// All actions in the set, for validation walks
    pub fn all(&self) -> impl Iterator<Item = &Action> {
        self.before
            .iter()
            .chain(self.after.iter())
            .chain(self.on_success.iter())
            .chain(self.on_failure.iter())
    }
}

/// Default values inherited by each action in a set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefaults {
    #[serde(default, skip_serializing_if = "is_false")]
    pub mute: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_retries: u32,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dir: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}

impl ActionDefaults {
    pub fn is_empty(&self) -> bool {
        !self.mute
            && self.max_total_seconds.is_none()
            && self.max_retries == 0
            && self.dir.is_empty()
            && self.env.is_empty()
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

/// A single shell command or wait predicate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Shell command to execute; exactly one of `cmd`/`wait`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,

    /// Predicate to poll instead of running a command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<ActionWait>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Suppress command output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,

    /// Overall time budget in seconds across all retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Working directory for the command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Extra KEY=VALUE environment entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,

    /// Capture trimmed stdout into these variables (deploy phase only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set_variables: Vec<SetVariable>,

    /// Deprecated singular form, folded into `setVariables` by migration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_variable: Option<String>,
}

/// Declaration of a variable captured from an action's stdout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariable {
    /// Uppercase-underscore variable name
    pub name: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub sensitive: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_indent: bool,
}

/// Wait predicate polled until success or timeout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionWait {
    /// Poll a cluster resource condition
    Cluster(WaitCluster),
    /// Poll an HTTP/TCP endpoint
    Network(WaitNetwork),
}

/// Cluster resource condition to wait for
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitCluster {
    /// Resource kind (pod, deployment, crd name, ...)
    pub kind: String,

    /// Resource name or label selector
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Condition to reach (Ready, Available, a jsonpath, ...); defaults to existence
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub condition: String,
}

/// Network endpoint to wait for
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitNetwork {
    /// One of http, https, tcp
    pub protocol: String,

    /// host:port or URL path portion
    pub address: String,

    /// Expected HTTP status code; any 2xx when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}
