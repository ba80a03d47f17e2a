//! Load a guest module, wire up the registry, and run `_start`.

use crate::error::HostError;
use crate::registry::HostRegistry;
use crate::HostState;
use std::path::Path;
use wasmtime::{Engine, Module, Store};

/// Run one guest module to completion. `args` are forwarded verbatim to the
/// guest's argument-retrieval calls.
pub fn run_module(module_path: &Path, args: Vec<String>) -> anyhow::Result<()> {
    let engine = Engine::default();
    let module = Module::from_file(&engine, module_path)?;
    let registry = HostRegistry::new(&engine)?;
    let mut store = Store::new(&engine, HostState::new(args));

    registry.resolve(&mut store, &module)?;
    let instance = registry.instantiate(&mut store, &module)?;
    let start = instance.get_typed_func::<(), ()>(&mut store, "_start")?;

    tracing::debug!(path = %module_path.display(), "running guest module");
    match start.call(&mut store, ()) {
        Ok(()) => Ok(()),
        // exit(0) is a clean stop, not a failure.
        Err(err) => match err.downcast_ref::<HostError>() {
            Some(HostError::Exit(0)) => Ok(()),
            _ => Err(err),
        },
    }
}

/// Classify a run failure into its exit-message category and text.
pub fn classify(err: &anyhow::Error) -> (&'static str, String) {
    match err.downcast_ref::<HostError>() {
        Some(host) => (host.category(), host.to_string()),
        None => match err.downcast_ref::<simchain_chain::ChainError>() {
            Some(chain) => ("host fault", chain.to_string()),
            None => ("vm error", format!("{err:#}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_host_error() {
        let err = anyhow::Error::new(HostError::GuestAssertion("boom".into()));
        assert_eq!(classify(&err), ("guest assertion", "boom".to_string()));
    }

    #[test]
    fn test_classify_unknown_error_is_vm_error() {
        let err = anyhow::anyhow!("wasm trap: unreachable");
        assert_eq!(classify(&err).0, "vm error");
    }
}
