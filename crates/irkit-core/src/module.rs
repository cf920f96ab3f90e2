//! Modules: the scope within which functions and globals see each other.

use indexmap::IndexMap;

use crate::error::IrError;
use crate::function::{Function, Temper};
use crate::types::Type;

/// A named global value, possibly external with a known address.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalValue {
    pub name: String,
    pub ty: Type,
    pub external: bool,
    pub address: Option<u64>,
}

impl GlobalValue {
    pub fn new(name: impl Into<String>, ty: Type) -> GlobalValue {
        GlobalValue {
            name: name.into(),
            ty,
            external: false,
            address: None,
        }
    }

    pub fn external(name: impl Into<String>, ty: Type, address: Option<u64>) -> GlobalValue {
        GlobalValue {
            name: name.into(),
            ty,
            external: true,
            address,
        }
    }
}

/// A module holding functions and globals by name, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Module {
    functions: IndexMap<String, Function>,
    globals: IndexMap<String, GlobalValue>,
    temper: Temper,
}

impl Module {
    pub fn new() -> Module {
        Module::default()
    }

    /// Adds a function. Its name must be unused.
    pub fn add_function(&mut self, function: Function) -> Result<(), IrError> {
        if self.functions.contains_key(function.name()) {
            return Err(IrError::DuplicateName {
                name: function.name().to_string(),
            });
        }
        self.functions.insert(function.name().to_string(), function);
        Ok(())
    }

    /// Adds a global. Its name must be unused.
    pub fn add_global(&mut self, global: GlobalValue) -> Result<(), IrError> {
        if self.globals.contains_key(&global.name) {
            return Err(IrError::DuplicateName {
                name: global.name.clone(),
            });
        }
        self.globals.insert(global.name.clone(), global);
        Ok(())
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn get_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.get_mut(name)
    }

    pub fn get_global(&self, name: &str) -> Option<&GlobalValue> {
        self.globals.get(name)
    }

    /// Removes a function for exclusive mutation, to be re-inserted with
    /// [`Module::put_function`]. The pipeline driver uses this so passes can
    /// mutate a function while reading the rest of the module.
    pub fn take_function(&mut self, name: &str) -> Option<Function> {
        self.functions.shift_remove(name)
    }

    /// Re-inserts a function previously removed with
    /// [`Module::take_function`].
    pub fn put_function(&mut self, function: Function) {
        self.functions.insert(function.name().to_string(), function);
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    pub fn globals(&self) -> impl Iterator<Item = &GlobalValue> {
        self.globals.values()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Mints a module-level unique name.
    pub fn temp(&mut self, hint: &str) -> String {
        self.temper.mint(hint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(name: &str) -> Function {
        Function::new(name, Type::function(Type::Void, vec![]), vec![]).unwrap()
    }

    #[test]
    fn duplicate_function_names_rejected() {
        let mut m = Module::new();
        m.add_function(f("main")).unwrap();
        assert!(matches!(
            m.add_function(f("main")),
            Err(IrError::DuplicateName { .. })
        ));
    }

    #[test]
    fn take_and_put_function() {
        let mut m = Module::new();
        m.add_function(f("main")).unwrap();
        m.add_function(f("helper")).unwrap();

        let func = m.take_function("main").unwrap();
        assert!(m.get_function("main").is_none());
        assert!(m.get_function("helper").is_some());
        m.put_function(func);
        assert!(m.get_function("main").is_some());
    }

    #[test]
    fn globals_by_name() {
        let mut m = Module::new();
        m.add_global(GlobalValue::external("malloc", Type::Opaque, Some(0x1000)))
            .unwrap();
        let g = m.get_global("malloc").unwrap();
        assert!(g.external);
        assert_eq!(g.address, Some(0x1000));
        assert!(m.add_global(GlobalValue::new("malloc", Type::Opaque)).is_err());
    }

    #[test]
    fn module_temper_is_scoped_to_module() {
        let mut m = Module::new();
        assert_eq!(m.temp("g"), "g");
        assert_eq!(m.temp("g"), "g_1");
    }
}
