//! The method table.
//!
//! A server exposes the methods of one or more registered services. Every
//! method carries its exposed name, its declared parameter and return kinds,
//! and the type-erased callable that runs it; the dispatcher binds decoded
//! arguments against the declared kinds before invoking.
//!
//! Each method is stored twice: under its exposed name and under the
//! lower-cased form, so lookup can fall back to a case-insensitive match.
//! Name collisions resolve last-wins, in registration order.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use xmlrpc_common::{Kind, Value};
//! use xmlrpc_server::{Method, Registry, Service};
//!
//! struct Status;
//!
//! impl Service for Status {
//!     fn methods(self: Arc<Self>) -> Vec<Method> {
//!         vec![Method::new("rpc_ping", [], [Kind::Int], move |_args| {
//!             Ok(vec![Value::Int(12345)])
//!         })]
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! registry.register(Arc::new(Status));
//! assert!(registry.lookup("RPC_PING").is_some());
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use xmlrpc_common::{Fault, Kind, Value};

/// The type-erased body of a registered method.
pub type MethodFn = Box<dyn Fn(&[Value]) -> Result<Vec<Value>, Fault> + Send + Sync>;

/// One callable RPC method: name, signature, body.
pub struct Method {
    name: String,
    params: Vec<Kind>,
    returns: Vec<Kind>,
    func: MethodFn,
}

impl Method {
    pub fn new<F>(
        name: impl Into<String>,
        params: impl Into<Vec<Kind>>,
        returns: impl Into<Vec<Kind>>,
        func: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> Result<Vec<Value>, Fault> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: params.into(),
            returns: returns.into(),
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter kinds, in call order.
    pub fn params(&self) -> &[Kind] {
        &self.params
    }

    /// Declared return kinds, in return order.
    pub fn returns(&self) -> &[Kind] {
        &self.returns
    }

    /// Invoke the method body with already-checked arguments.
    pub fn call(&self, args: &[Value]) -> Result<Vec<Value>, Fault> {
        (self.func)(args)
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

/// A set of methods exposed together, typically one receiver object's
/// public surface. Implementations enumerate their methods explicitly;
/// nothing private leaks because nothing private is listed.
pub trait Service: Send + Sync {
    fn methods(self: Arc<Self>) -> Vec<Method>;
}

/// Maps method names to registered methods.
///
/// Filled before the server starts and read-only afterwards, so serving
/// needs no lock.
#[derive(Default)]
pub struct Registry {
    methods: HashMap<String, Arc<Method>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every method of `service` under its own name.
    pub fn register<S: Service + 'static>(&mut self, service: Arc<S>) {
        self.register_mapped(service, |name| Some(name.to_owned()));
    }

    /// Register `service`'s methods, passing each name through `mapper`.
    /// The mapper may rewrite the exposed name, or return `None` to skip the
    /// method entirely.
    pub fn register_mapped<S, F>(&mut self, service: Arc<S>, mapper: F)
    where
        S: Service + 'static,
        F: Fn(&str) -> Option<String>,
    {
        for mut method in service.methods() {
            let exposed = match mapper(method.name()) {
                Some(name) => name,
                None => continue,
            };
            method.name = exposed.clone();
            tracing::debug!(method = %exposed, "registering method");

            let method = Arc::new(method);
            self.methods.insert(exposed.to_lowercase(), method.clone());
            self.methods.insert(exposed, method);
        }
    }

    /// Find a method by name: exact match first, lower-cased fallback
    /// second.
    pub fn lookup(&self, name: &str) -> Option<&Arc<Method>> {
        self.methods
            .get(name)
            .or_else(|| self.methods.get(&name.to_lowercase()))
    }

    /// Exposed method names (the exact-case entries), sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .methods
            .iter()
            .filter(|(key, method)| **key == method.name)
            .map(|(key, _)| key.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("methods", &self.method_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widgets;

    impl Service for Widgets {
        fn methods(self: Arc<Self>) -> Vec<Method> {
            vec![
                Method::new("RPC_Ping", [], [Kind::Int], |_| Ok(vec![Value::Int(1)])),
                Method::new("RPC_Count", [Kind::Int], [Kind::Int], |args| {
                    Ok(vec![Value::Int(args[0].as_i32().unwrap_or(0) + 1)])
                }),
            ]
        }
    }

    #[test]
    fn test_register_exposes_every_listed_method() {
        let mut registry = Registry::new();
        registry.register(Arc::new(Widgets));
        assert_eq!(registry.method_names(), ["RPC_Count", "RPC_Ping"]);
    }

    #[test]
    fn test_lookup_falls_back_to_lowercase() {
        let mut registry = Registry::new();
        registry.register(Arc::new(Widgets));

        assert!(registry.lookup("RPC_Ping").is_some());
        assert!(registry.lookup("rpc_ping").is_some());
        // neither stored form, but the lower-cased query matches
        assert!(registry.lookup("Rpc_pIng").is_some());
        assert!(registry.lookup("rpc_pong").is_none());
    }

    #[test]
    fn test_mapper_renames_and_skips() {
        let mut registry = Registry::new();
        registry.register_mapped(Arc::new(Widgets), |name| match name {
            "RPC_Ping" => Some("ping".to_owned()),
            _ => None,
        });

        assert_eq!(registry.method_names(), ["ping"]);
        assert!(registry.lookup("RPC_Count").is_none());
        assert_eq!(registry.lookup("ping").unwrap().name(), "ping");
    }

    #[test]
    fn test_collisions_are_last_wins() {
        struct First;
        struct Second;
        impl Service for First {
            fn methods(self: Arc<Self>) -> Vec<Method> {
                vec![Method::new("go", [], [Kind::Int], |_| Ok(vec![Value::Int(1)]))]
            }
        }
        impl Service for Second {
            fn methods(self: Arc<Self>) -> Vec<Method> {
                vec![Method::new("go", [], [Kind::Int], |_| Ok(vec![Value::Int(2)]))]
            }
        }

        let mut registry = Registry::new();
        registry.register(Arc::new(First));
        registry.register(Arc::new(Second));

        let result = registry.lookup("go").unwrap().call(&[]).unwrap();
        assert_eq!(result, vec![Value::Int(2)]);
    }

    #[test]
    fn test_method_signature_accessors() {
        let m = Method::new("f", [Kind::Int, Kind::Bool], [Kind::String], |_| {
            Ok(vec![Value::String("x".into())])
        });
        assert_eq!(m.params(), [Kind::Int, Kind::Bool]);
        assert_eq!(m.returns(), [Kind::String]);
    }
}
