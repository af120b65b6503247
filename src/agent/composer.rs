//! Plugin composition.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::agent::{Agent, AgentError, AgentInner};
use crate::config::AgentConfig;
use crate::plugins::{Capabilities, Plugin, Registry};

impl Agent {
    /// Build every configured plugin in order, then the system plugins the
    /// configuration did not mention, sorted by kind.
    pub fn new(config: AgentConfig, registry: &Registry) -> Result<Agent, AgentError> {
        let mut plugins: Vec<Arc<dyn Plugin>> = Vec::with_capacity(config.plugins.len());
        let mut configured: BTreeSet<String> = BTreeSet::new();

        for (i, spec) in config.plugins.into_iter().enumerate() {
            let index = i + 1;
            spec.validate()
                .map_err(|source| AgentError::InvalidSpec { index, source })?;

            let descriptor = registry.lookup(&spec.kind).ok_or_else(|| AgentError::KindNotFound {
                index,
                kind: spec.kind.clone(),
            })?;

            if spec.name.trim().is_empty() {
                return Err(AgentError::EmptyName {
                    index,
                    kind: spec.kind,
                });
            }
            if configured.contains(&spec.kind) {
                return Err(AgentError::DuplicateKind {
                    index,
                    kind: spec.kind,
                    name: spec.name,
                });
            }

            let kind = spec.kind.clone();
            let name = spec.name.clone();
            let plugin = descriptor
                .instantiate(spec)
                .map_err(|source| AgentError::Instantiate {
                    index,
                    kind: kind.clone(),
                    name: name.clone(),
                    source,
                })?;

            configured.insert(kind);
            plugins.push(plugin);
        }

        for (kind, descriptor) in registry.system_descriptors() {
            if configured.contains(kind) {
                continue;
            }
            let plugin = descriptor
                .instantiate(descriptor.default_spec())
                .map_err(|source| AgentError::SystemPlugin {
                    kind: kind.to_string(),
                    source,
                })?;
            plugins.push(plugin);
        }

        for (i, plugin) in plugins.iter().enumerate() {
            tracing::info!(
                ordinal = i + 1,
                kind = plugin.kind(),
                name = plugin.name(),
                capabilities = %Capabilities::of(plugin.as_ref()),
                "Plugin composed"
            );
        }

        Ok(Agent {
            inner: Arc::new(AgentInner {
                address: config.address,
                control: config.control,
                plugins,
            }),
        })
    }
}
