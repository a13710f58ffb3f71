//! Migration discovery and the cached catalog
//!
//! Scans the configured directory for files following the
//! `<prefix><digits><suffix>` convention, parses the digits as the version
//! identifier, and keeps a descending (newest first) catalog. Units are
//! constructed through the factory once, when the catalog is first built; the
//! catalog is then cached until explicitly invalidated.

use std::fs;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::definitions::{MigratorConfig, UnitDescriptor, Version};
use crate::factory::UnitFactory;
use crate::unit::{Migration, UnitContext};

pub(crate) struct CatalogEntry {
    pub descriptor: UnitDescriptor,
    pub unit: Option<Arc<dyn Migration>>,
}

pub struct Registry {
    config: MigratorConfig,
    factory: Arc<dyn UnitFactory>,
    context: UnitContext,
    catalog: OnceCell<Vec<CatalogEntry>>,
}

impl Registry {
    pub fn new(
        config: MigratorConfig,
        factory: Arc<dyn UnitFactory>,
        context: UnitContext,
    ) -> Self {
        Self {
            config,
            factory,
            context,
            catalog: OnceCell::new(),
        }
    }

    /// The descending catalog. An unreadable migrations directory yields an
    /// empty catalog rather than an error.
    pub(crate) fn catalog(&self) -> &[CatalogEntry] {
        self.catalog.get_or_init(|| self.build_catalog())
    }

    /// Drop the cached catalog so new files are picked up on next access.
    pub fn invalidate(&mut self) {
        self.catalog.take();
    }

    /// Discovered descriptors, newest first.
    pub fn descriptors(&self) -> Vec<UnitDescriptor> {
        self.catalog().iter().map(|entry| entry.descriptor.clone()).collect()
    }

    pub(crate) fn resolve(&self, version: Version) -> Option<Arc<dyn Migration>> {
        self.catalog()
            .iter()
            .find(|entry| entry.descriptor.version == version)
            .and_then(|entry| entry.unit.clone())
    }

    fn build_catalog(&self) -> Vec<CatalogEntry> {
        let mut entries = Vec::new();
        let dir = &self.config.migrations_dir;
        let listing = match fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "could not read migrations directory");
                return entries;
            }
        };

        for dir_entry in listing.flatten() {
            let path = dir_entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(version) =
                parse_version(file_name, &self.config.file_prefix, &self.config.file_suffix)
            else {
                debug!(file = file_name, "ignoring file outside the naming convention");
                continue;
            };

            let descriptor = UnitDescriptor { version, path };
            let unit = self.factory.resolve(&descriptor, &self.context);
            if unit.is_none() {
                warn!(%version, "no registered constructor for discovered migration");
            }
            entries.push(CatalogEntry { descriptor, unit });
        }

        entries.sort_by(|a, b| b.descriptor.version.cmp(&a.descriptor.version));
        debug!(count = entries.len(), "migration catalog built");
        entries
    }
}

/// Extract the numeric version from `<prefix><digits><suffix>` file names.
fn parse_version(file_name: &str, prefix: &str, suffix: &str) -> Option<Version> {
    let stem = file_name.strip_prefix(prefix)?.strip_suffix(suffix)?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
