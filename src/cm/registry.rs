use std::collections::HashMap;
use std::sync::Arc;

use crate::datasets::DatasetCatalog;

use super::schema::SchemaError;
use super::{BuildingLoad, CalculationModule, HeatDemand, MultiplyRaster};

/// Registry of the calculation modules known to this process.
///
/// Built once at startup; the set and order of modules are stable for the
/// process lifetime.
pub struct CmRegistry {
    modules: HashMap<String, Arc<dyn CalculationModule>>,
}

impl CmRegistry {
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Registry holding the statically-known modules.
    pub fn with_default_modules(catalog: Arc<DatasetCatalog>) -> Result<Self, SchemaError> {
        let mut registry = Self::new();
        registry.register(Arc::new(BuildingLoad::new()?));
        registry.register(Arc::new(HeatDemand::new(Arc::clone(&catalog))?));
        registry.register(Arc::new(MultiplyRaster::new(catalog)?));
        Ok(registry)
    }

    pub fn register(&mut self, module: Arc<dyn CalculationModule>) {
        self.modules.insert(module.name().to_string(), module);
    }

    /// All modules, ordered by name.
    pub fn list(&self) -> Vec<Arc<dyn CalculationModule>> {
        let mut list: Vec<_> = self.modules.values().cloned().collect();
        list.sort_by(|a, b| a.name().cmp(b.name()));
        list
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CalculationModule>> {
        self.modules.get(name).cloned()
    }
}

impl Default for CmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CmRegistry {
        let catalog = Arc::new(DatasetCatalog::embedded().unwrap());
        CmRegistry::with_default_modules(catalog).unwrap()
    }

    #[test]
    fn test_list_is_ordered_by_name() {
        let names: Vec<String> = registry()
            .list()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["cm_buildingload", "cm_heat_demand", "multiply_raster"]
        );
    }

    #[test]
    fn test_get_known_module() {
        let registry = registry();
        let module = registry.get("cm_heat_demand").unwrap();
        assert_eq!(module.pretty_name(), "District heating potential");
    }

    #[test]
    fn test_get_unknown_module() {
        assert!(registry().get("cm_does_not_exist").is_none());
    }

    #[test]
    fn test_every_module_ships_an_object_schema() {
        for module in registry().list() {
            let doc = module.schema().document();
            assert!(doc.is_object(), "{} schema must be an object", module.name());
            assert!(doc.get("properties").is_some());
        }
    }
}
