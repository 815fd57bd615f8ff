//! Processor registry
//!
//! Maps processor names to implementations. Built once at startup, then
//! shared read-only (behind an `Arc`) by every orchestration instance.
//! Processors cannot be removed once registered.

use std::{collections::HashMap, sync::Arc};

use payloop_common::tracing::info;

use crate::{error::RegistryError, processor::PaymentProcessor};

#[derive(Debug, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn PaymentProcessor>>,
}

impl ProcessorRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `processor` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateProcessor`] if `name` is taken; the
    /// existing registration is left in place.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.processors.contains_key(&name) {
            return Err(RegistryError::DuplicateProcessor(name));
        }

        info!(processor = %name, "Registered processor");
        self.processors.insert(name, processor);

        Ok(())
    }

    /// Register a processor under its own [`PaymentProcessor::name`].
    ///
    /// # Errors
    ///
    /// See [`ProcessorRegistry::register`].
    pub fn register_processor<P>(&mut self, processor: P) -> Result<(), RegistryError>
    where
        P: PaymentProcessor + 'static,
    {
        let name = processor.name().to_string();
        self.register(name, Arc::new(processor))
    }

    /// Look up a processor by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ProcessorNotFound`], listing every registered
    /// name, if there is no such processor.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn PaymentProcessor>, RegistryError> {
        self.processors
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::ProcessorNotFound {
                name: name.to_string(),
                available: self.list(),
            })
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<_> = self.processors.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::ScriptedProcessor;

    #[test]
    fn test_registry_operations() {
        let mut registry = ProcessorRegistry::new();
        assert!(registry.is_empty());

        registry
            .register_processor(ScriptedProcessor::new("stripe"))
            .unwrap();
        registry
            .register("razorpay", Arc::new(ScriptedProcessor::new("razorpay")))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.has("stripe"));
        assert!(!registry.has("paypal"));
        assert_eq!(registry.list(), vec!["razorpay", "stripe"]);
        assert_eq!(registry.resolve("stripe").unwrap().name(), "stripe");
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register("stripe", Arc::new(ScriptedProcessor::new("first")))
            .unwrap();

        let error = registry
            .register("stripe", Arc::new(ScriptedProcessor::new("second")))
            .unwrap_err();

        assert_eq!(error, RegistryError::DuplicateProcessor("stripe".to_string()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("stripe").unwrap().name(), "first");
    }

    #[test]
    fn test_resolve_unknown_enumerates_registered() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register_processor(ScriptedProcessor::new("stripe"))
            .unwrap();
        registry
            .register_processor(ScriptedProcessor::new("adyen"))
            .unwrap();

        let error = registry.resolve("paypal").unwrap_err();
        assert_eq!(
            error,
            RegistryError::ProcessorNotFound {
                name: "paypal".to_string(),
                available: vec!["adyen".to_string(), "stripe".to_string()],
            }
        );
        assert!(error.to_string().contains("Available: adyen, stripe"));
    }
}
