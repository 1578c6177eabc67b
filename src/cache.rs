use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::compile::{compile_page, CompileOptions, CompileOutput};
use crate::error::ResolveError;
use crate::ir::ZenIR;

type Slot = Arc<OnceLock<Result<Arc<CompileOutput>, ResolveError>>>;

/// Content-addressed memo of compiled pages.
///
/// Each key is computed at most once: concurrent callers for the same key
/// block on the same cell. Failures are memoised as well.
#[derive(Default)]
pub struct ResolutionCache {
    entries: Mutex<HashMap<String, Slot>>,
    dir: Option<PathBuf>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist successful entries as `<key>.json` under `dir`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self, ResolveError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        Ok(Self {
            entries: Mutex::new(HashMap::new()),
            dir: Some(dir),
        })
    }

    pub fn compute_key(
        page: &ZenIR,
        options: &CompileOptions,
        catalog: &Catalog,
    ) -> Result<String, ResolveError> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_string(page)?.as_bytes());
        hasher.update([0u8]);
        hasher.update(options.fingerprint().as_bytes());
        hasher.update([0u8]);
        hasher.update(catalog.fingerprint().as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn compile(
        &self,
        page: &ZenIR,
        catalog: &Catalog,
        options: &CompileOptions,
    ) -> Result<Arc<CompileOutput>, ResolveError> {
        let key = Self::compute_key(page, options, catalog)?;
        self.get_or_insert_with(&key, || compile_page(page.clone(), catalog, options))
    }

    pub fn get_or_insert_with<F>(&self, key: &str, compute: F) -> Result<Arc<CompileOutput>, ResolveError>
    where
        F: FnOnce() -> Result<CompileOutput, ResolveError>,
    {
        let slot = {
            let mut entries = self.entries.lock();
            entries.entry(key.to_string()).or_default().clone()
        };

        slot.get_or_init(|| {
            if let Some(hit) = self.load(key) {
                debug!(key, "cache hit on disk");
                return Ok(Arc::new(hit));
            }
            let output = compute()?;
            self.store(key, &output);
            Ok(Arc::new(output))
        })
        .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(format!("{}.json", key)))
    }

    fn load(&self, key: &str) -> Option<CompileOutput> {
        let path = self.entry_path(key)?;
        if !path.exists() {
            return None;
        }
        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|data| serde_json::from_str::<CompileOutput>(&data).map_err(|e| e.to_string()));
        match parsed {
            Ok(output) => Some(output),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding unreadable cache entry");
                fs::remove_file(&path).ok();
                None
            }
        }
    }

    fn store(&self, key: &str, output: &CompileOutput) {
        let Some(path) = self.entry_path(key) else {
            return;
        };
        let written = serde_json::to_string(output)
            .map_err(|e| e.to_string())
            .and_then(|data| fs::write(&path, data).map_err(|e| e.to_string()));
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "failed to persist cache entry");
        }
    }
}

fn io_error(path: &Path, err: std::io::Error) -> ResolveError {
    ResolveError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::emit_module;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn output() -> CompileOutput {
        let ir = ZenIR::new("pages/index.zen", vec![], vec![]);
        let module = emit_module(&ir).unwrap();
        CompileOutput {
            ir,
            module,
            bundle_plan: None,
        }
    }

    #[test]
    fn test_key_computed_once_under_contention() {
        let cache = ResolutionCache::new();
        let calls = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    cache
                        .get_or_insert_with("k", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(10));
                            Ok(output())
                        })
                        .unwrap();
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failures_are_memoised() {
        let cache = ResolutionCache::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            let result = cache.get_or_insert_with("bad", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ResolveError::Malformed("nope".to_string()))
            });
            assert!(result.is_err());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_persisted_entry_survives_new_cache() {
        let dir = tempfile::tempdir().unwrap();
        let first = ResolutionCache::with_dir(dir.path()).unwrap();
        first.get_or_insert_with("abc", || Ok(output())).unwrap();
        assert!(dir.path().join("abc.json").exists());

        let second = ResolutionCache::with_dir(dir.path()).unwrap();
        let hit = second
            .get_or_insert_with("abc", || Err(ResolveError::Malformed("recomputed".to_string())))
            .unwrap();
        assert_eq!(hit.ir.file_path, "pages/index.zen");
    }

    #[test]
    fn test_corrupt_entry_is_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("abc.json"), "{ not json").unwrap();

        let cache = ResolutionCache::with_dir(dir.path()).unwrap();
        let calls = AtomicUsize::new(0);
        cache
            .get_or_insert_with("abc", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(output())
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let data = fs::read_to_string(dir.path().join("abc.json")).unwrap();
        assert!(data.contains("pages/index.zen"));
    }

    #[test]
    fn test_key_depends_on_options_and_catalog() {
        let page = ZenIR::new("a.zen", vec![], vec![]);
        let catalog = Catalog::new();
        let base = ResolutionCache::compute_key(&page, &CompileOptions::default(), &catalog).unwrap();

        let strict = CompileOptions {
            strict_props: true,
            ..CompileOptions::default()
        };
        assert_ne!(base, ResolutionCache::compute_key(&page, &strict, &catalog).unwrap());

        let other = Catalog::new().with(crate::catalog::ComponentMetadata::new("Card", vec![], vec![]));
        assert_ne!(base, ResolutionCache::compute_key(&page, &CompileOptions::default(), &other).unwrap());
        assert_eq!(base, ResolutionCache::compute_key(&page, &CompileOptions::default(), &catalog).unwrap());
    }

    #[test]
    fn test_key_stable_across_deserialisations() {
        let page_json = serde_json::json!({
            "filePath": "pages/index.zen",
            "template": { "raw": "", "nodes": [], "expressions": [] },
            "script": {
                "raw": "state n = 0",
                "attributes": { "lang": "ts", "setup": "true", "a": "1", "b": "2", "c": "3", "d": "4" }
            },
            "styles": []
        });
        let catalog_json = serde_json::json!({
            "Card": {
                "script": "const x = 1",
                "scriptAttributes": { "lang": "ts", "setup": "true", "a": "1", "b": "2", "c": "3", "d": "4" }
            }
        });

        let keys: std::collections::HashSet<String> = (0..20)
            .map(|_| {
                let page: ZenIR = serde_json::from_value(page_json.clone()).unwrap();
                let catalog = Catalog::from_json(catalog_json.clone()).unwrap();
                ResolutionCache::compute_key(&page, &CompileOptions::default(), &catalog).unwrap()
            })
            .collect();
        assert_eq!(keys.len(), 1);
    }
}
