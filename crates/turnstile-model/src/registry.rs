//! Per-runtime cache of validated state tables.

use crate::machine::Machine;
use crate::state::{MachineDeclaration, ModelError, StateTable};
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Default)]
struct Tables {
    by_type: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    declarations: BTreeMap<&'static str, MachineDeclaration>,
}

/// Tables are built and validated on first use, then shared immutably by
/// every instance of the type. Cloning the registry shares the cache.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<Tables>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `M` ahead of time so bad tables fail early.
    pub fn register<M: Machine>(&self) -> Result<(), ModelError> {
        self.table::<M>().map(|_| ())
    }

    pub fn table<M: Machine>(&self) -> Result<Arc<StateTable<M>>, ModelError> {
        let mut tables = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = tables.by_type.get(&TypeId::of::<M>()) {
            return Arc::clone(existing)
                .downcast::<StateTable<M>>()
                .map_err(|_| ModelError::TypeMismatch {
                    machine: std::any::type_name::<M>(),
                });
        }

        let table = M::states();
        table.validate()?;
        log::debug!(
            "registered machine type {} ({} states)",
            table.machine_name(),
            table.states().count()
        );
        tables
            .declarations
            .insert(table.machine_name(), table.declaration());
        let table = Arc::new(table);
        tables
            .by_type
            .insert(TypeId::of::<M>(), table.clone() as Arc<dyn Any + Send + Sync>);
        Ok(table)
    }

    /// Declarations of every registered type, ordered by machine name.
    pub fn declarations(&self) -> Vec<MachineDeclaration> {
        let tables = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        tables.declarations.values().cloned().collect()
    }

    pub fn declaration(&self, machine: &str) -> Option<MachineDeclaration> {
        let tables = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        tables.declarations.get(machine).cloned()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Registry")
            .field("machines", &tables.declarations.keys().collect::<Vec<_>>())
            .finish()
    }
}
