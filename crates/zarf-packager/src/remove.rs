//! Package removal
//!
//! Walks the deployed components in reverse deploy order, uninstalling each
//! component's charts in reverse install order. The record is saved after
//! every single chart uninstall so a crash leaves consistent partial state;
//! the record itself is deleted once the last component is gone.

use tokio_util::sync::CancellationToken;

use zarf_core::schema::Component;
use zarf_core::state::ComponentStatus;
use zarf_core::VariableConfig;
use zarf_kube::{Cluster, HelmClient, PackageStore};

use crate::actions::ActionRunner;
use crate::error::{PackagerError, Result};

/// Inputs to one package removal
#[derive(Debug, Clone)]
pub struct RemoveOptions {
    /// Name of the deployed package
    pub package_name: String,

    /// Remove only these components; empty removes everything
    pub components: Vec<String>,
}

/// Removes a deployed package
pub struct Remover<'a> {
    pub store: &'a dyn PackageStore,
    pub helm: &'a dyn HelmClient,
    pub cluster: Option<Cluster>,
    pub cancel: CancellationToken,
}

impl<'a> Remover<'a> {
    /// Remove the requested components, or the whole package
    pub async fn run(&self, opts: &RemoveOptions) -> Result<()> {
        let mut record = self.store.get_package(&opts.package_name).await?;
        let definition = record.data.clone();

        // Reverse deploy order at package granularity.
        let order: Vec<String> = record
            .deployed_components
            .iter()
            .rev()
            .map(|c| c.name.clone())
            .filter(|name| opts.components.is_empty() || opts.components.contains(name))
            .collect();

        tracing::info!(
            package = %opts.package_name,
            components = order.len(),
            "removing package components"
        );

        for name in order {
            if self.cancel.is_cancelled() {
                return Err(PackagerError::Cancelled(format!(
                    "removing component {name:?}"
                )));
            }

            let component = definition
                .components
                .iter()
                .find(|c| c.name == name)
                .cloned()
                .unwrap_or_else(|| Component {
                    name: name.clone(),
                    ..Default::default()
                });

            self.remove_component(&opts.package_name, &component).await?;
        }

        // When nothing is left, the record itself goes away.
        record = match self.store.get_package(&opts.package_name).await {
            Ok(r) => r,
            Err(zarf_kube::KubeError::PackageNotFound { .. }) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if record.deployed_components.is_empty() {
            self.store.delete_package(&opts.package_name).await?;
            tracing::info!(package = %opts.package_name, "package record deleted");
        }

        Ok(())
    }

    /// Remove one component: onRemove.before, chart uninstalls in reverse,
    /// onRemove.after, then the closing success/failure set.
    async fn remove_component(&self, package_name: &str, component: &Component) -> Result<()> {
        tracing::info!(component = %component.name, "removing component");

        let mut variables = VariableConfig::new();
        let on_remove = &component.actions.on_remove;

        let mut runner = ActionRunner::new(
            &mut variables,
            self.cluster.as_ref(),
            ".",
            self.cancel.clone(),
        );
        runner.run_before(on_remove).await?;

        let result = self.uninstall_charts(package_name, component).await;

        let mut runner = ActionRunner::new(
            &mut variables,
            self.cluster.as_ref(),
            ".",
            self.cancel.clone(),
        );
        match result {
            Ok(()) => {
                runner.run_after(on_remove).await?;
                runner.run_on_success(on_remove).await;

                // Drop the component from the record once it is fully gone.
                let mut record = self.store.get_package(package_name).await?;
                record
                    .deployed_components
                    .retain(|c| c.name != component.name);
                self.store.save_package(&record).await?;
                Ok(())
            }
            Err(e) => {
                runner.run_on_failure(on_remove).await;
                Err(e)
            }
        }
    }

    async fn uninstall_charts(&self, package_name: &str, component: &Component) -> Result<()> {
        let mut record = self.store.get_package(package_name).await?;

        let Some(deployed) = record
            .deployed_components
            .iter_mut()
            .find(|c| c.name == component.name)
        else {
            tracing::warn!(component = %component.name, "component is not recorded as deployed");
            return Ok(());
        };
        deployed.status = ComponentStatus::Removing;
        let charts: Vec<_> = deployed.installed_charts.clone();
        self.store.save_package(&record).await?;

        // Reverse install order at chart granularity, re-saving the record
        // after every uninstall.
        for chart in charts.iter().rev() {
            let found = self
                .helm
                .uninstall(&chart.chart_name, &chart.namespace)
                .await?;
            if !found {
                tracing::warn!(
                    chart = %chart.chart_name,
                    "release not found during removal"
                );
            }

            let mut record = self.store.get_package(package_name).await?;
            if let Some(deployed) = record
                .deployed_components
                .iter_mut()
                .find(|c| c.name == component.name)
            {
                deployed
                    .installed_charts
                    .retain(|c| c != chart);
            }
            self.store.save_package(&record).await?;
        }

        Ok(())
    }
}
