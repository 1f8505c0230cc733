//! Behaviour shared by every eero entity

use std::collections::HashMap;
use std::sync::Arc;

use ha_core::constants::ATTR_ATTRIBUTION;
use ha_helpers::{DataUpdateCoordinator, DeviceInfo};
use serde_json::{json, Value};

use crate::api::EeroApi;
use crate::models::{Account, Network, Resource, ResourceKind};
use crate::{ATTRIBUTION, DOMAIN, MANUFACTURER};

/// Which resource kinds a variable applies to, and its display label
pub(crate) struct VariableInfo {
    pub kinds: &'static [ResourceKind],
    pub label: &'static str,
}

/// An entity bound to one variable of one network resource
///
/// The resource is looked up in the coordinator's latest snapshot on every
/// read, so the entity follows renames and disappears cleanly.
pub(crate) struct EeroEntity {
    pub coordinator: Arc<DataUpdateCoordinator<Value>>,
    pub api: Arc<EeroApi>,
    pub network_id: String,
    pub resource_id: Option<String>,
    pub variable: &'static str,
    pub label: &'static str,
}

impl EeroEntity {
    pub fn new(
        coordinator: Arc<DataUpdateCoordinator<Value>>,
        api: Arc<EeroApi>,
        network_id: &str,
        resource_id: Option<&str>,
        variable: &'static str,
        label: &'static str,
    ) -> Self {
        Self {
            coordinator,
            api,
            network_id: network_id.to_string(),
            resource_id: resource_id.map(String::from),
            variable,
            label,
        }
    }

    /// Run `f` against the current network and resource
    pub fn with_resource<R>(&self, f: impl FnOnce(Network<'_>, Resource<'_>) -> R) -> Option<R> {
        let data = self.coordinator.data()?;
        let network = Account::new(&data).network(&self.network_id)?;
        let resource = match &self.resource_id {
            None => Resource::Network(network),
            Some(id) => network.resource(id)?,
        };
        Some(f(network, resource))
    }

    pub fn unique_id(&self) -> String {
        match &self.resource_id {
            None => format!("{}-{}", self.network_id, self.variable),
            Some(id) => format!("{}-{}-{}", self.network_id, id, self.variable),
        }
    }

    pub fn name(&self) -> String {
        let label = self.label;
        self.with_resource(|network, resource| match resource {
            Resource::Client(c) => {
                format!("{} {} {}", network.name(), c.name_connection_type(), label)
            }
            Resource::Eero(e) => format!("{} {} Eero {}", network.name(), e.name(), label),
            Resource::Profile(p) => {
                format!("{} {} Profile {}", network.name(), p.name(), label)
            }
            Resource::Network(n) => format!("{} {}", n.name(), label),
        })
        .unwrap_or_else(|| label.to_string())
    }

    pub fn available(&self) -> bool {
        self.coordinator.last_update_success() && self.with_resource(|_, _| ()).is_some()
    }

    pub fn base_attributes(&self) -> HashMap<String, Value> {
        HashMap::from([(ATTR_ATTRIBUTION.to_string(), json!(ATTRIBUTION))])
    }

    pub fn device_info(&self) -> Option<DeviceInfo> {
        let network_id = self.network_id.clone();
        self.with_resource(|_, resource| {
            let (name, model, sw_version) = match resource {
                Resource::Network(n) => (n.name().to_string(), crate::MODEL_NETWORK, None),
                Resource::Eero(e) => (
                    e.name().to_string(),
                    e.model().unwrap_or(crate::MODEL_EERO),
                    e.os_version(),
                ),
                Resource::Profile(p) => (p.name().to_string(), crate::MODEL_PROFILE, None),
                Resource::Client(c) => (c.name_connection_type(), crate::MODEL_CLIENT, None),
            };
            let mut info = DeviceInfo::new(DOMAIN, resource.id())
                .with_name(name)
                .with_manufacturer(MANUFACTURER)
                .with_model(model);
            if let Some(sw_version) = sw_version {
                info = info.with_sw_version(sw_version);
            }
            if resource.kind() != ResourceKind::Network {
                info = info.with_via_device(DOMAIN, network_id);
            }
            info
        })
    }
}

/// Build one entity per (resource, variable) pair the variable table allows
pub(crate) fn expand<T>(
    network: Network<'_>,
    selection: &crate::ResourceSelection,
    table: &[(&'static str, VariableInfo)],
    premium_only: &[&str],
    mut build: impl FnMut(Option<&str>, &'static str, &'static str) -> T,
) -> Vec<T> {
    let mut targets: Vec<(Option<&str>, ResourceKind)> = vec![(None, ResourceKind::Network)];
    for eero in network.eeros() {
        if selection.eeros.iter().any(|id| id == eero.id()) {
            targets.push((Some(eero.id()), ResourceKind::Eero));
        }
    }
    for profile in network.profiles() {
        if selection.profiles.iter().any(|id| id == profile.id()) {
            targets.push((Some(profile.id()), ResourceKind::Profile));
        }
    }
    for client in network.clients() {
        if selection.clients.iter().any(|id| id == client.id()) {
            targets.push((Some(client.id()), ResourceKind::Client));
        }
    }

    let mut built = Vec::new();
    for (resource_id, kind) in targets {
        for (variable, info) in table {
            if premium_only.contains(variable) && !network.premium_enabled() {
                continue;
            }
            if info.kinds.contains(&kind) {
                built.push(build(resource_id, *variable, info.label));
            }
        }
    }
    built
}
