//! The host-call registry.
//!
//! All symbols live in the `env` module and are registered exactly once;
//! the linker rejects duplicate definitions, so a double registration is a
//! startup error rather than silent shadowing. `resolve` walks a loaded
//! module's imports before instantiation and rejects any the registry
//! lacks, so a mismatched guest fails with a named symbol instead of a
//! generic link error.

use crate::error::HostError;
use crate::{chain_calls, crypto_calls, db_calls, file_calls, process_calls, HostState};
use wasmtime::{Engine, Instance, Linker, Module, Store};

pub struct HostRegistry {
    linker: Linker<HostState>,
}

impl HostRegistry {
    /// Build the full registry over `engine`.
    pub fn new(engine: &Engine) -> anyhow::Result<Self> {
        let mut linker = Linker::new(engine);
        process_calls::register(&mut linker)?;
        file_calls::register(&mut linker)?;
        crypto_calls::register(&mut linker)?;
        chain_calls::register(&mut linker)?;
        db_calls::register(&mut linker)?;
        Ok(Self { linker })
    }

    /// Reject `module` if it imports anything the registry does not define.
    pub fn resolve(
        &self,
        store: &mut Store<HostState>,
        module: &Module,
    ) -> Result<(), HostError> {
        for import in module.imports() {
            if self
                .linker
                .get(&mut *store, import.module(), import.name())
                .is_none()
            {
                return Err(HostError::UnresolvedImport {
                    module: import.module().to_string(),
                    name: import.name().to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn instantiate(
        &self,
        store: &mut Store<HostState>,
        module: &Module,
    ) -> anyhow::Result<Instance> {
        self.linker.instantiate(&mut *store, module)
    }
}
