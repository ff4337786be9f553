//! memoized model handles, keyed by model name and credential.

use std::collections::HashMap;
use std::sync::Arc;

use bevy::log::info;
use bevy::prelude::Resource;

use crate::credential::Credential;
use crate::error::ModelError;
use crate::model::{ChatModel, build_gemini_model};

type Factory = dyn Fn(&str, &Credential) -> Result<Arc<dyn ChatModel>, ModelError> + Send + Sync;

/// builds model handles on demand and keeps them until cleared. a new key
/// for the same model gets a fresh handle.
#[derive(Resource, Clone)]
pub struct ModelCache {
    factory: Arc<Factory>,
    entries: HashMap<(String, Credential), Arc<dyn ChatModel>>,
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new(|model, key| build_gemini_model(model, key.expose()))
    }
}

impl ModelCache {
    pub fn new(
        factory: impl Fn(&str, &Credential) -> Result<Arc<dyn ChatModel>, ModelError> + Send + Sync + 'static,
    ) -> Self {
        Self { factory: Arc::new(factory), entries: HashMap::new() }
    }

    pub fn get_or_build(
        &mut self,
        model: &str,
        credential: &Credential,
    ) -> Result<Arc<dyn ChatModel>, ModelError> {
        let key = (model.to_string(), credential.clone());
        if let Some(hit) = self.entries.get(&key) {
            return Ok(hit.clone());
        }
        let built = (self.factory)(model, credential)?;
        self.entries.insert(key, built.clone());
        info!(target: "bevy_llm_chat", "model cache: built '{}' (entries={})", model, self.entries.len());
        Ok(built)
    }

    pub fn clear(&mut self) {
        info!(target: "bevy_llm_chat", "model cache: cleared {} entries", self.entries.len());
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_cache(builds: Arc<AtomicUsize>) -> ModelCache {
        ModelCache::new(move |model, _| {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(ScriptedModel::chunks(model, &[])) as Arc<dyn ChatModel>)
        })
    }

    #[test]
    fn reuses_handle_for_same_name_and_key() {
        let builds = Arc::new(AtomicUsize::new(0));
        let mut cache = counting_cache(builds.clone());
        let key = Credential::new("AIzaSyA0123456789abcdefgh").unwrap();
        let a = cache.get_or_build("gemini-1.5-flash", &key).unwrap();
        let b = cache.get_or_build("gemini-1.5-flash", &key).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn new_key_or_clear_rebuilds() {
        let builds = Arc::new(AtomicUsize::new(0));
        let mut cache = counting_cache(builds.clone());
        let k1 = Credential::new("AIzaSyA0123456789abcdefgh").unwrap();
        let k2 = Credential::new("AIzaSyB0123456789abcdefgh").unwrap();
        cache.get_or_build("m", &k1).unwrap();
        cache.get_or_build("m", &k2).unwrap();
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
        cache.get_or_build("m", &k1).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn factory_errors_are_not_cached() {
        let mut cache = ModelCache::new(|_, _| Err(ModelError::new("invalid model")));
        let key = Credential::new("AIzaSyA0123456789abcdefgh").unwrap();
        assert!(cache.get_or_build("m", &key).is_err());
        assert!(cache.is_empty());
    }
}
