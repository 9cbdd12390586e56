//! Supervises plugin launch sequencing and runtime orchestration.

use std::sync::Arc;

use tracing::{info, warn};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::delivery::{DeliveryFactory, FluentDeliveryFactory};
use crate::health::{HealthReporter, StructuredHealthReporter};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to launch the plugin runtime.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) factory: Arc<dyn DeliveryFactory>,
    pub(crate) shutdown: S,
}

/// Runs the plugin using the production collaborators.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        factory: Arc::new(FluentDeliveryFactory),
        shutdown: SystemShutdownSignal,
    })
}

/// Runs the plugin with injected collaborators.
pub(crate) fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        factory,
        shutdown,
    } = plan;

    let daemon = bootstrap_with(&loader, Arc::clone(&reporter), factory)?;
    let listener = daemon.serve()?;

    let waited = shutdown.wait();
    if let Ok(signal) = &waited {
        reporter.shutdown_requested(*signal);
    }

    listener.shutdown();
    let joined = listener.join();
    daemon.shutdown();
    if let Err(error) = &joined {
        warn!(target: PROCESS_TARGET, %error, "listener did not stop cleanly");
    }

    waited?;
    joined?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
