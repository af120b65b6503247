//! Capability registry.
//!
//! Maps a plugin kind to the descriptor that builds it. A registry is filled
//! once at process start from an explicit list of descriptors and is shared
//! read-only afterwards (`Arc<Registry>`).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::plugins::capability::{Plugin, PluginError};
use crate::plugins::spec::Spec;
use crate::plugins::{health, mesh, zipkin};

type DefaultSpecFn = dyn Fn() -> Spec + Send + Sync;
type InstantiateFn = dyn Fn(Spec) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync;

/// Error type for registration. Both variants are programming errors and
/// callers abort startup on them.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("plugin descriptor has an empty kind")]
    EmptyKind,

    #[error("plugin kind {0} is registered twice")]
    DuplicateKind(String),
}

/// Constructor metadata for one plugin kind.
#[derive(Clone)]
pub struct Descriptor {
    kind: String,
    system: bool,
    default_spec: Arc<DefaultSpecFn>,
    instantiate: Arc<InstantiateFn>,
}

impl Descriptor {
    /// `default_spec` must build a fresh, complete spec (name included) on
    /// every call.
    pub fn new<D, I>(kind: impl Into<String>, default_spec: D, instantiate: I) -> Self
    where
        D: Fn() -> Spec + Send + Sync + 'static,
        I: Fn(Spec) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync + 'static,
    {
        Self {
            kind: kind.into(),
            system: false,
            default_spec: Arc::new(default_spec),
            instantiate: Arc::new(instantiate),
        }
    }

    /// Mark the kind as system-level: it is activated even when absent from
    /// the configuration.
    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_system(&self) -> bool {
        self.system
    }

    pub fn default_spec(&self) -> Spec {
        (self.default_spec)()
    }

    pub fn instantiate(&self, spec: Spec) -> Result<Arc<dyn Plugin>, PluginError> {
        (self.instantiate)(spec)
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("kind", &self.kind)
            .field("system", &self.system)
            .finish_non_exhaustive()
    }
}

/// Kind → descriptor table. Iteration is ordered by kind.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    descriptors: BTreeMap<String, Descriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the plugins shipped with the crate.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_descriptors([health::descriptor(), mesh::descriptor(), zipkin::descriptor()])
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = Descriptor>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, descriptor: Descriptor) -> Result<(), RegistryError> {
        if descriptor.kind.is_empty() {
            return Err(RegistryError::EmptyKind);
        }
        if self.descriptors.contains_key(&descriptor.kind) {
            return Err(RegistryError::DuplicateKind(descriptor.kind));
        }

        tracing::debug!(kind = %descriptor.kind, system = descriptor.system, "Plugin kind registered");
        self.descriptors.insert(descriptor.kind.clone(), descriptor);
        Ok(())
    }

    pub fn lookup(&self, kind: &str) -> Option<&Descriptor> {
        self.descriptors.get(kind)
    }

    /// System descriptors, ordered by kind.
    pub fn system_descriptors(&self) -> BTreeMap<&str, &Descriptor> {
        self.descriptors
            .iter()
            .filter(|(_, d)| d.system)
            .map(|(kind, d)| (kind.as_str(), d))
            .collect()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(String);

    impl Plugin for Noop {
        fn name(&self) -> &str {
            &self.0
        }

        fn kind(&self) -> &str {
            "Noop"
        }
    }

    fn noop(kind: &str) -> Descriptor {
        let default_kind = kind.to_string();
        Descriptor::new(
            kind,
            move || Spec::new(default_kind.clone(), "noop"),
            |spec: Spec| Ok(Arc::new(Noop(spec.name)) as Arc<dyn Plugin>),
        )
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let result = Registry::from_descriptors([noop("A"), noop("A")]);
        assert!(matches!(result, Err(RegistryError::DuplicateKind(kind)) if kind == "A"));
    }

    #[test]
    fn test_empty_kind_rejected() {
        let mut registry = Registry::new();
        assert!(matches!(registry.register(noop("")), Err(RegistryError::EmptyKind)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_system_descriptors_filtered_and_sorted() {
        let registry =
            Registry::from_descriptors([noop("Zeta").system(), noop("Mid"), noop("Alpha").system()]).unwrap();

        let system: Vec<&str> = registry.system_descriptors().into_keys().collect();
        assert_eq!(system, vec!["Alpha", "Zeta"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_default_spec_is_fresh_each_call() {
        let descriptor = noop("A");
        let mut first = descriptor.default_spec();
        first.name.push_str("-changed");
        assert_eq!(descriptor.default_spec().name, "noop");
    }

    #[test]
    fn test_builtin_registry() {
        let registry = Registry::builtin().unwrap();
        let kinds: Vec<&str> = registry.kinds().collect();
        assert_eq!(kinds, vec!["EaseMesh", "Health", "Zipkin"]);
        assert!(registry.lookup("Health").unwrap().is_system());
        assert!(!registry.lookup("Zipkin").unwrap().is_system());
        assert!(registry.lookup("Jaeger").is_none());
    }
}
