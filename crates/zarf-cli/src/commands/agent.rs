//! `zarf internal agent`

use std::sync::Arc;

use miette::{IntoDiagnostic, Result};

use zarf_agent::AgentState;

use super::{require_cluster, store_for};

pub async fn run(listen: &str) -> Result<()> {
    let cluster = require_cluster().await?;
    let store = store_for(&cluster);

    let state = AgentState {
        store: Arc::new(store),
    };

    zarf_agent::serve(state, listen).await.into_diagnostic()
}
