//! Built-in functions and the function table for parley.
//!
//! Functions give the model a way to act: do arithmetic, read the clock,
//! save generated code into a per-session scratch directory.

pub mod calculator;
pub mod current_time;
pub mod save_code;
pub mod scratch;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parley_core::provider::ToolDefinition;
use parley_core::tool::{Function, FunctionRegistry};

pub use scratch::ScratchDirs;

/// Name-keyed table of callable functions.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Default, Clone)]
pub struct FunctionTable {
    functions: HashMap<String, Arc<dyn Function>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function. A later registration under the same name
    /// replaces the earlier one.
    pub fn register(&mut self, function: Arc<dyn Function>) {
        let name = function.name().to_string();
        if self.functions.insert(name.clone(), function).is_some() {
            tracing::warn!(function = %name, "Replacing previously registered function");
        }
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[async_trait]
impl FunctionRegistry for FunctionTable {
    async fn list_schemas(&self, _session_id: &str) -> Vec<ToolDefinition> {
        let mut schemas: Vec<ToolDefinition> =
            self.functions.values().map(|f| f.to_definition()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    fn resolve(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.functions.get(name).cloned()
    }
}

/// Create a function table with all built-in functions.
pub fn default_registry(scratch: Arc<ScratchDirs>) -> FunctionTable {
    let mut table = FunctionTable::new();
    table.register(Arc::new(calculator::Calculator));
    table.register(Arc::new(current_time::CurrentTime));
    table.register(Arc::new(save_code::SaveCodeToFile::new(scratch)));
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_registry_lists_sorted_schemas() {
        let table = default_registry(Arc::new(ScratchDirs::in_temp_dir()));
        assert_eq!(table.len(), 3);

        let schemas = table.list_schemas("s1").await;
        let names: Vec<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["calculator", "current_time", "save_code_to_file"]);
        assert_eq!(schemas[0].parameters["type"], "object");
    }

    #[test]
    fn resolve_by_name() {
        let table = default_registry(Arc::new(ScratchDirs::in_temp_dir()));
        assert!(table.resolve("calculator").is_some());
        assert!(table.resolve("rm_rf").is_none());
        assert!(table.resolve("save_code_to_file").unwrap().needs_session());
    }

    #[test]
    fn later_registration_wins() {
        let mut table = FunctionTable::new();
        table.register(Arc::new(calculator::Calculator));
        table.register(Arc::new(calculator::Calculator));
        assert_eq!(table.names(), vec!["calculator"]);
    }
}
