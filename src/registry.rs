use std::collections::HashMap;

use crate::procedure::BoundProcedure;
use crate::Error;

/// the name to procedure table of one server
///
/// it's filled before the server starts and never changes afterwards, so
/// workers read it concurrently without any lock
#[derive(Debug, Default)]
pub struct Registry {
    procedures: HashMap<String, BoundProcedure>,
}

impl Registry {
    /// create an empty registry
    pub fn new() -> Self {
        Registry::default()
    }

    /// insert the procedure, a name can only be bound once
    pub fn register(&mut self, procedure: BoundProcedure) -> Result<(), Error> {
        if self.procedures.contains_key(procedure.name()) {
            return Err(Error::DuplicateRegistration(procedure.name().to_owned()));
        }
        self.procedures
            .insert(procedure.name().to_owned(), procedure);
        Ok(())
    }

    /// find the procedure bound under the name
    pub fn lookup(&self, name: &str) -> Option<&BoundProcedure> {
        self.procedures.get(name)
    }

    /// number of bound procedures
    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    /// true if nothing is bound
    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    /// the bound names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.procedures.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Args;

    #[test]
    fn duplicate_name_is_rejected() {
        let mut registry = Registry::new();
        registry
            .register(BoundProcedure::new("sum", |a: i32, b: i32| a + b))
            .unwrap();

        let err = registry
            .register(BoundProcedure::new("sum", |a: i32| a))
            .unwrap_err();
        assert_eq!(err.to_string(), "'sum' has already been registered as an RPC.");

        // the first binding is still there
        let sum = registry.lookup("sum").unwrap();
        assert_eq!(sum.arity(), 2);
        let ret = sum.invoke((2, 3).into_args().unwrap()).unwrap();
        assert_eq!(ret.into_value::<i32>().unwrap(), 5);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_and_names() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());
        registry.register(BoundProcedure::new("f2", || 42)).unwrap();
        registry.register(BoundProcedure::new("f1", || {})).unwrap();

        assert!(registry.lookup("l3").is_none());
        assert_eq!(registry.names(), vec!["f1".to_owned(), "f2".to_owned()]);
    }
}
