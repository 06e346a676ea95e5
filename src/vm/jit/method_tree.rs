use std::collections::BTreeMap;
use std::sync::Arc;
use parking_lot::RwLock;
use crate::vm::jit::codegen::CompiledMethod;

/// Compiled methods keyed by the start of their code area range, so any address inside a method
/// (data segment included) finds it.
#[derive(Debug, Default)]
pub struct MethodTree {
    methods: RwLock<BTreeMap<u64, Arc<CompiledMethod>>>,
}

impl MethodTree {
    pub fn insert(&self, method: CompiledMethod) -> Arc<CompiledMethod> {
        let method = Arc::new(method);
        self.methods.write().insert(method.start(), method.clone());
        method
    }

    pub fn find(&self, address: u64) -> Option<Arc<CompiledMethod>> {
        self.methods.read()
            .range(..=address)
            .next_back()
            .map(|(_, method)| method)
            .filter(|method| method.contains(address))
            .cloned()
    }

    /// Forgets a method on unload. Its patch references go with the last handle.
    pub fn remove(&self, method: &CompiledMethod) -> Option<Arc<CompiledMethod>> {
        self.methods.write().remove(&method.start())
    }

    pub fn len(&self) -> usize {
        self.methods.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
