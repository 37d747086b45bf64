//! Functions a worker can be asked to run, addressed by `(module, function)`.

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use protocol::{
    payload::{FromPayload, ToPayload},
    FunctionRef, Payload, SessionError,
};
use rayon::prelude::*;
use serde::{de::DeserializeOwned, Serialize};

/// Maps a whole argument batch to one result per argument, in order.
pub type RemoteFn = Arc<dyn Fn(Vec<Payload>) -> Result<Vec<Payload>> + Send + Sync>;

#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<FunctionRef, RemoteFn>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function that sees the whole batch at once.
    pub fn register<F>(&mut self, module: &str, function: &str, f: F) -> &mut Self
    where
        F: Fn(Vec<Payload>) -> Result<Vec<Payload>> + Send + Sync + 'static,
    {
        self.functions
            .insert(FunctionRef::new(module, function), Arc::new(f));
        self
    }

    /// Registers a per-item function. Items of a batch are decoded, evaluated
    /// in parallel on the rayon pool and encoded back in submission order.
    pub fn register_map<A, R, F>(&mut self, module: &str, function: &str, f: F) -> &mut Self
    where
        A: DeserializeOwned + Send,
        R: Serialize + Send,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        self.register(module, function, move |args| {
            args.into_par_iter()
                .map(|arg| {
                    let arg = A::from_payload(&arg).context("decode argument")?;
                    f(arg).to_payload().context("encode result")
                })
                .collect()
        })
    }

    pub fn get(&self, name: &FunctionRef) -> Result<RemoteFn> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| SessionError::UnknownFunction(name.to_string()).into())
    }

    pub fn contains(&self, name: &FunctionRef) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Functions every worker binary ships with, useful for checking a
/// deployment end to end without the fitness code.
pub fn builtin() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register("builtin", "echo", |args| Ok(args));
    registry.register_map("builtin", "sum", |xs: Vec<f64>| xs.iter().sum::<f64>());
    registry
}
