//! Connector prerequisite checks.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::settings::{EngineConnectorSettings, HostProbe};
use super::version::SemVerTriple;

/// Outcome of an availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    /// True when every prerequisite is satisfied.
    pub available: bool,
    /// Why the connector is unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Availability {
    /// A usable connector.
    #[must_use]
    pub const fn available() -> Self {
        Self {
            available: true,
            reason: None,
        }
    }

    /// An unusable connector.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            reason: Some(reason.into()),
        }
    }
}

/// Decides whether a connector's prerequisites hold on this host.
///
/// Checks run in order and stop at the first failure:
///
/// 1. the engine binary (native) or controller binary (virtualized) resolves;
/// 2. for virtualized connectors, the scoped instance exists and is running;
/// 3. the detected version meets the configured minimum, when both are known.
#[derive(Clone)]
pub struct AvailabilityChecker {
    probe: Arc<dyn HostProbe>,
    minimum_version: Option<SemVerTriple>,
}

impl AvailabilityChecker {
    /// Creates a checker.
    #[must_use]
    pub fn new(probe: Arc<dyn HostProbe>, minimum_version: Option<SemVerTriple>) -> Self {
        Self {
            probe,
            minimum_version,
        }
    }

    /// Checks `settings`. Never fails; problems are reported as a reason.
    pub async fn check(&self, settings: &EngineConnectorSettings) -> Availability {
        let prerequisites = self.check_prerequisites(settings).await;
        if !prerequisites.available {
            return prerequisites;
        }
        self.check_minimum_version(settings)
    }

    /// Checks the program and instance prerequisites, leaving the version
    /// aside. Never runs the engine program itself.
    pub async fn check_prerequisites(&self, settings: &EngineConnectorSettings) -> Availability {
        let outcome = match self.check_binary(settings) {
            Err(reason) => Availability::unavailable(reason),
            Ok(()) => self
                .check_instance(settings)
                .await
                .map_or_else(Availability::unavailable, |()| Availability::available()),
        };
        debug!(target: "podbridge::availability", connector = %settings.id, ?outcome, "prerequisites checked");
        outcome
    }

    /// Checks the detected version against the configured minimum. Unknown
    /// versions pass.
    #[must_use]
    pub fn check_minimum_version(&self, settings: &EngineConnectorSettings) -> Availability {
        let outcome = self
            .check_version(settings)
            .map_or_else(Availability::unavailable, |()| Availability::available());
        debug!(target: "podbridge::availability", connector = %settings.id, ?outcome, "version checked");
        outcome
    }

    fn check_binary(&self, settings: &EngineConnectorSettings) -> Result<(), String> {
        let label = if settings.controller.is_some() {
            "controller program"
        } else {
            "engine program"
        };
        let path = settings.required_program();
        if self.probe.resolve_program(path).is_some() {
            Ok(())
        } else {
            Err(format!("{label} '{path}' could not be found"))
        }
    }

    async fn check_instance(&self, settings: &EngineConnectorSettings) -> Result<(), String> {
        let Some(controller) = settings.controller.as_ref() else {
            return Ok(());
        };
        let Some(scope) = controller.scope.as_deref() else {
            return Err(String::from("no virtualization instance is configured or discoverable"));
        };
        let instances = self
            .probe
            .list_instances(settings.engine.virtualization(), &controller.path)
            .await
            .map_err(|error| format!("unable to list instances: {error}"))?;
        match instances.iter().find(|instance| instance.name == scope) {
            None => Err(format!("instance '{scope}' does not exist")),
            Some(instance) if !instance.running => Err(format!("instance '{scope}' is not running")),
            Some(_) => Ok(()),
        }
    }

    fn check_version(&self, settings: &EngineConnectorSettings) -> Result<(), String> {
        let version = settings.program.version;
        match self.minimum_version {
            Some(minimum) if !version.is_unknown() && version < minimum => Err(format!(
                "{} version {version} is older than the minimum supported {minimum}",
                settings.program.name
            )),
            _ => Ok(()),
        }
    }
}
