//! Function modules and their entry point.
//!
//! A module is a plain `fn(&mut Web3Function)` that registers exactly one `onRun`
//! handler. Modules are compiled into a [`FunctionCatalog`] keyed by function name.

use crate::context::ExecutionContext;
use crate::runtime::outcome::ExecutionResult;
use crate::utils::{HarnessError, Result};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

/// Type-erased `onRun` handler.
pub type OnRun = Arc<dyn Fn(ExecutionContext) -> BoxFuture<'static, anyhow::Result<ExecutionResult>> + Send + Sync>;

/// Module registration hook.
pub type Register = fn(&mut Web3Function);

/// Registrar handed to a module at load time.
#[derive(Default)]
pub struct Web3Function {
    handlers: Vec<OnRun>,
}

impl Web3Function {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_run<F, Fut>(&mut self, handler: F)
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ExecutionResult>> + Send + 'static,
    {
        self.handlers.push(Arc::new(move |ctx| Box::pin(handler(ctx))));
    }

    /// The single registered handler.
    pub fn entry_point(mut self) -> Result<OnRun> {
        match self.handlers.len() {
            0 => Err(HarnessError::NoEntryPointRegistered),
            1 => Ok(self.handlers.remove(0)),
            n => Err(HarnessError::MultipleEntryPoints(n)),
        }
    }
}

/// Compiled modules by function name.
#[derive(Clone, Default)]
pub struct FunctionCatalog {
    modules: BTreeMap<String, Register>,
}

impl FunctionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, register: Register) -> Self {
        self.register(name, register);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, register: Register) {
        self.modules.insert(name.into(), register);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    /// Run the module's registration and return its entry point.
    pub fn load(&self, name: &str) -> Result<OnRun> {
        let register = self
            .modules
            .get(name)
            .ok_or_else(|| HarnessError::BuildFailed(format!("no compiled module named '{name}'")))?;
        let mut registrar = Web3Function::new();
        register(&mut registrar);
        registrar.entry_point()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn skip(_: ExecutionContext) -> anyhow::Result<ExecutionResult> {
        Ok(ExecutionResult::skip("nothing to do"))
    }

    fn none(_: &mut Web3Function) {}

    fn one(w3f: &mut Web3Function) {
        w3f.on_run(skip);
    }

    fn two(w3f: &mut Web3Function) {
        w3f.on_run(skip);
        w3f.on_run(|_ctx| async { Ok::<_, anyhow::Error>(ExecutionResult::skip("second")) });
    }

    #[test]
    fn exactly_one_entry_point() {
        let catalog = FunctionCatalog::new().with("none", none).with("one", one).with("two", two);
        assert!(catalog.load("one").is_ok());
        assert_eq!(catalog.load("none").err(), Some(HarnessError::NoEntryPointRegistered));
        assert_eq!(catalog.load("two").err(), Some(HarnessError::MultipleEntryPoints(2)));
        assert!(matches!(catalog.load("missing"), Err(HarnessError::BuildFailed(_))));
        assert_eq!(catalog.names(), vec!["none", "one", "two"]);
    }
}
