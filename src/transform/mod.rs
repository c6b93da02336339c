//! Transformer registry (C6) — a process-wide, lazily-initialized map from
//! transformer name to a forward/inverse factory pair, plus the composition
//! rules the writer and scanner use to build a single end-to-end function
//! out of a header's ordered `transformer` descriptors.

pub mod builtins;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// A transform applied to one reassembled block payload.
///
/// `scratch` is a capacity hint the implementation may reuse across calls;
/// it carries no guaranteed content. `inputs` is the list of byte slices to
/// consume, in order — almost always a single slice, but composition can
/// hand a freshly produced intermediate buffer straight through.
///
/// `Arc`-wrapped (not `Box`) so a composed chain can be shared across the
/// writer's parallel per-block flush tasks without recompiling it per task.
pub type TransformFn = Arc<dyn Fn(&mut Vec<u8>, &[&[u8]]) -> Result<Vec<u8>> + Send + Sync>;

/// Builds a [`TransformFn`] from a descriptor's configuration string.
pub type Factory = Box<dyn Fn(&str) -> Result<TransformFn> + Send + Sync>;

struct Entry {
    forward: Factory,
    inverse: Factory,
}

/// Name-keyed transformer factory table.
pub struct Registry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Registry {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a transformer's forward/inverse factories under `name`.
    ///
    /// Idempotent: the first registration for a given name wins, and later
    /// calls with the same name are no-ops.
    pub fn init(&self, name: &str, forward: Factory, inverse: Factory) {
        let mut map = self.entries.write();
        map.entry(name.to_string())
            .or_insert(Entry { forward, inverse });
    }

    /// Build the forward function named by `descriptor` (`"name"` or
    /// `"name config"`).
    pub fn forward(&self, descriptor: &str) -> Result<TransformFn> {
        let (name, config) = split_descriptor(descriptor);
        let map = self.entries.read();
        let entry = map
            .get(name)
            .ok_or_else(|| Error::UnknownTransformer(name.to_string()))?;
        (entry.forward)(config)
    }

    /// Build the inverse function named by `descriptor`.
    pub fn inverse(&self, descriptor: &str) -> Result<TransformFn> {
        let (name, config) = split_descriptor(descriptor);
        let map = self.entries.read();
        let entry = map
            .get(name)
            .ok_or_else(|| Error::UnknownTransformer(name.to_string()))?;
        (entry.inverse)(config)
    }
}

fn split_descriptor(descriptor: &str) -> (&str, &str) {
    match descriptor.split_once(' ') {
        Some((name, config)) => (name, config),
        None => (descriptor, ""),
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry, populated with the built-in set on first use.
pub fn global() -> &'static Registry {
    GLOBAL.get_or_init(|| {
        let registry = Registry::new();
        builtins::register_defaults(&registry);
        registry
    })
}

fn apply_chain(fns: &[TransformFn], inputs: &[&[u8]]) -> Result<Vec<u8>> {
    if fns.is_empty() {
        return Ok(inputs.concat());
    }
    let mut scratch = Vec::new();
    let mut current = fns[0](&mut scratch, inputs)?;
    for f in &fns[1..] {
        current = f(&mut scratch, &[current.as_slice()])?;
    }
    Ok(current)
}

/// Compose `[t0, t1, .., tK-1]` into the writer-side function
/// `tK-1 ∘ .. ∘ t1 ∘ t0` (apply `t0` first). Empty input is the identity.
pub fn compose_forward(descriptors: &[&str]) -> Result<TransformFn> {
    let fns: Vec<TransformFn> = descriptors
        .iter()
        .map(|d| global().forward(d))
        .collect::<Result<_>>()?;
    Ok(Arc::new(move |scratch, inputs| apply_chain(&fns, inputs).map(|v| {
        scratch.clear();
        v
    })))
}

/// Compose the matching scanner-side inverse,
/// `t0⁻¹ ∘ t1⁻¹ ∘ .. ∘ tK-1⁻¹` (apply `tK-1⁻¹` first). Empty input is the
/// identity.
pub fn compose_inverse(descriptors: &[&str]) -> Result<TransformFn> {
    let fns: Vec<TransformFn> = descriptors
        .iter()
        .rev()
        .map(|d| global().inverse(d))
        .collect::<Result<_>>()?;
    Ok(Arc::new(move |scratch, inputs| apply_chain(&fns, inputs).map(|v| {
        scratch.clear();
        v
    })))
}
