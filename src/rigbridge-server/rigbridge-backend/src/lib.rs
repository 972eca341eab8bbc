// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::HashMap;
use std::time::Duration;

use rigbridge_app::normalize_name;
use rigbridge_core::{DynResult, RadioLink};

pub mod dummy;
#[cfg(feature = "kenwood")]
pub mod kenwood;

pub use dummy::{DummyHandle, DummyLink};
#[cfg(feature = "kenwood")]
pub use kenwood::KenwoodLink;

/// Connection details for instantiating a radio link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RigAccess {
    None,
    Serial {
        path: String,
        baud: u32,
        timeout: Duration,
    },
}

pub type BackendFactory = fn(RigAccess) -> DynResult<Box<dyn RadioLink>>;

/// Context for registering and instantiating radio links.
#[derive(Clone)]
pub struct RegistrationContext {
    factories: HashMap<String, BackendFactory>,
}

impl RegistrationContext {
    /// Create a new empty registration context.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory under a stable name (e.g. "kenwood").
    pub fn register_backend(&mut self, name: &str, factory: BackendFactory) {
        self.factories.insert(normalize_name(name), factory);
    }

    pub fn is_backend_registered(&self, name: &str) -> bool {
        self.factories.contains_key(&normalize_name(name))
    }

    /// List registered backend names.
    pub fn registered_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiate a link based on the selected name and access method.
    pub fn build_link(&self, name: &str, access: RigAccess) -> DynResult<Box<dyn RadioLink>> {
        let factory = self
            .factories
            .get(&normalize_name(name))
            .ok_or_else(|| format!("Unknown rig backend: {}", name))?;
        factory(access)
    }
}

impl Default for RegistrationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Register all built-in backends enabled by features on a context.
pub fn register_builtin_backends_on(context: &mut RegistrationContext) {
    context.register_backend("dummy", dummy_factory);
    #[cfg(feature = "kenwood")]
    context.register_backend("kenwood", kenwood_factory);
}

fn dummy_factory(_access: RigAccess) -> DynResult<Box<dyn RadioLink>> {
    Ok(Box::new(DummyLink::new()))
}

#[cfg(feature = "kenwood")]
fn kenwood_factory(access: RigAccess) -> DynResult<Box<dyn RadioLink>> {
    match access {
        RigAccess::Serial {
            path,
            baud,
            timeout,
        } => Ok(Box::new(KenwoodLink::open(&path, baud, timeout)?)),
        RigAccess::None => Err("Kenwood backend requires serial access".into()),
    }
}
