use std::{
    collections::HashMap,
    sync::{Arc, OnceLock, PoisonError, RwLock},
};

use tracing::debug;

const DEFAULT_ALIASES: [(&str, &str); 3] = [
    ("DSC", "flex.messaging.messages.CommandMessageExt"),
    ("DSK", "flex.messaging.messages.AcknowledgeMessageExt"),
    ("DSA", "flex.messaging.messages.AsyncMessageExt"),
];

/// Mapping from short wire class names to canonical class names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    aliases: HashMap<String, String>,
}

impl AliasTable {
    /// Table with the BlazeDS short message aliases.
    pub fn with_defaults() -> Self {
        let mut table = Self::default();
        for (alias, class_name) in DEFAULT_ALIASES {
            table.insert(alias, class_name);
        }
        table
    }

    /// Canonical name for `class_name`, or `class_name` itself when it is not
    /// an alias.
    pub fn resolve<'a>(&'a self, class_name: &'a str) -> &'a str {
        self.aliases
            .get(class_name)
            .map(String::as_str)
            .unwrap_or(class_name)
    }

    pub fn insert(&mut self, alias: impl Into<String>, class_name: impl Into<String>) {
        self.aliases.insert(alias.into(), class_name.into());
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Process wide alias table. Readers take a snapshot, writers replace the
/// whole table, so a decode in progress never sees a partial update.
pub struct ClassAliasRegistry {
    table: RwLock<Arc<AliasTable>>,
}

impl ClassAliasRegistry {
    pub fn global() -> &'static ClassAliasRegistry {
        static REGISTRY: OnceLock<ClassAliasRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| ClassAliasRegistry {
            table: RwLock::new(Arc::new(AliasTable::with_defaults())),
        })
    }

    pub fn snapshot(&self) -> Arc<AliasTable> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn register(&self, alias: &str, class_name: &str) {
        let mut guard = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let mut table = AliasTable::clone(&guard);
        table.insert(alias, class_name);
        *guard = Arc::new(table);
        debug!(alias, class_name, "Registered class alias");
    }
}
