//! Unit resolution through a compiled constructor table
//!
//! Dynamic hosts resolve a discovered migration by evaluating its source file
//! at runtime. Here that is a [`UnitFactory`]: discovery still walks the
//! filesystem, but construction goes through a compiled version-to-constructor
//! map, keeping the engine a single deployable binary.

use std::collections::HashMap;
use std::sync::Arc;

use crate::definitions::{UnitDescriptor, Version};
use crate::unit::{Migration, UnitContext};

/// Resolves a discovered descriptor into a constructed unit.
pub trait UnitFactory: Send + Sync {
    fn resolve(
        &self,
        descriptor: &UnitDescriptor,
        context: &UnitContext,
    ) -> Option<Arc<dyn Migration>>;
}

type Constructor = Box<dyn Fn(&UnitContext) -> Arc<dyn Migration> + Send + Sync>;

/// Compiled version → constructor table.
#[derive(Default)]
pub struct StaticUnitFactory {
    constructors: HashMap<Version, Constructor>,
}

impl StaticUnitFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, version: impl Into<Version>, constructor: F)
    where
        F: Fn(&UnitContext) -> Arc<dyn Migration> + Send + Sync + 'static,
    {
        self.constructors.insert(version.into(), Box::new(constructor));
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl UnitFactory for StaticUnitFactory {
    fn resolve(
        &self,
        descriptor: &UnitDescriptor,
        context: &UnitContext,
    ) -> Option<Arc<dyn Migration>> {
        self.constructors
            .get(&descriptor.version)
            .map(|constructor| constructor(context))
    }
}
