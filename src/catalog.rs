//! Component catalog: the read-only name → definition table the resolver
//! expands against.
//!
//! Discovery (walking `.zen` sources and parsing them) happens in the host;
//! this module only loads its JSON output, either as one document or as a
//! directory of per-component manifests.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::ResolveError;
use crate::ir::{AttributeValue, ExpressionIR, SourceLocation, TemplateNode};

// ═══════════════════════════════════════════════════════════════════════════════
// METADATA TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDefinition {
    pub name: Option<String>,
    #[serde(default)]
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub nodes: Vec<TemplateNode>,
    #[serde(default)]
    pub expressions: Vec<ExpressionIR>,
    #[serde(default)]
    pub slots: Vec<SlotDefinition>,
    #[serde(default)]
    pub props: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub script_attributes: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub has_script: bool,
    #[serde(default)]
    pub has_styles: bool,
}

impl ComponentMetadata {
    /// Bare definition, mostly useful for hosts and tests building catalogs by hand.
    pub fn new(name: impl Into<String>, nodes: Vec<TemplateNode>, expressions: Vec<ExpressionIR>) -> Self {
        let name = name.into();
        let slots = collect_slots(&nodes);
        ComponentMetadata {
            path: format!("{}.zen", name),
            name,
            template: String::new(),
            nodes,
            expressions,
            slots,
            props: vec![],
            styles: vec![],
            script: None,
            script_attributes: None,
            has_script: false,
            has_styles: false,
        }
    }

    pub fn with_props(mut self, props: &[&str]) -> Self {
        self.props = props.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self.has_script = true;
        self
    }

    pub fn with_style(mut self, css: impl Into<String>) -> Self {
        self.styles.push(css.into());
        self.has_styles = true;
        self
    }

    /// Script text when the component actually carries one.
    pub fn script_text(&self) -> Option<&str> {
        self.script.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// `<slot>` declarations of a template, in document order.
pub fn collect_slots(nodes: &[TemplateNode]) -> Vec<SlotDefinition> {
    fn traverse(node: &TemplateNode, slots: &mut Vec<SlotDefinition>) {
        if let TemplateNode::Element(el) = node {
            if el.tag.eq_ignore_ascii_case("slot") {
                let name = el.attributes.iter().find_map(|attr| match &attr.value {
                    AttributeValue::Static(v) if attr.name == "name" => Some(v.clone()),
                    _ => None,
                });
                slots.push(SlotDefinition {
                    name,
                    location: el.location.clone(),
                });
            }
        }
        for list in node.child_lists() {
            for child in list {
                traverse(child, slots);
            }
        }
    }

    let mut slots = Vec::new();
    for node in nodes {
        traverse(node, &mut slots);
    }
    slots
}

// ═══════════════════════════════════════════════════════════════════════════════
// CATALOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a name lookup. Callers must handle `Missing` explicitly.
#[derive(Debug, Clone, Copy)]
pub enum Lookup<'a> {
    Found(&'a ComponentMetadata),
    Missing,
}

/// Immutable once built; shared by reference across parallel resolutions.
#[derive(Debug, Default)]
pub struct Catalog {
    components: HashMap<String, Arc<ComponentMetadata>>,
    fingerprint: OnceLock<String>,
}

impl Clone for Catalog {
    fn clone(&self) -> Self {
        Catalog {
            components: self.components.clone(),
            fingerprint: OnceLock::new(),
        }
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, meta: ComponentMetadata) {
        if self.components.contains_key(&meta.name) {
            warn!(component = %meta.name, "catalog entry replaced");
        }
        self.fingerprint = OnceLock::new();
        self.components.insert(meta.name.clone(), Arc::new(meta));
    }

    pub fn with(mut self, meta: ComponentMetadata) -> Self {
        self.insert(meta);
        self
    }

    /// Exact-name lookup; tag classification belongs to discovery.
    pub fn lookup(&self, name: &str) -> Lookup<'_> {
        match self.components.get(name) {
            Some(meta) => Lookup::Found(meta.as_ref()),
            None => Lookup::Missing,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    /// Accepts either `{ "Name": {...} }` or `[{...}, ...]`.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ResolveError> {
        let mut catalog = Catalog::new();
        match value {
            serde_json::Value::Array(items) => {
                for item in items {
                    catalog.insert(serde_json::from_value(item)?);
                }
            }
            serde_json::Value::Object(map) => {
                for (key, item) in map {
                    let mut meta: ComponentMetadata = serde_json::from_value(item)?;
                    if meta.name.is_empty() {
                        meta.name = key;
                    }
                    catalog.insert(meta);
                }
            }
            serde_json::Value::Null => {}
            other => {
                return Err(ResolveError::Malformed(format!(
                    "catalog must be an object or array, got {}",
                    other
                )))
            }
        }
        Ok(catalog)
    }

    /// Load every `*.json` manifest under `dir`. Each file holds one
    /// component or a whole catalog document.
    pub fn load_dir(dir: &Path) -> Result<Self, ResolveError> {
        let mut catalog = Catalog::new();
        if !dir.exists() {
            return Err(ResolveError::Io {
                path: dir.to_string_lossy().to_string(),
                message: "catalog directory does not exist".to_string(),
            });
        }

        let mut manifests: Vec<_> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.into_path())
            .filter(|path| path.is_file() && path.extension().map_or(false, |ext| ext == "json"))
            .collect();
        manifests.sort();

        for path in manifests {
            let text = fs::read_to_string(&path).map_err(|e| ResolveError::Io {
                path: path.to_string_lossy().to_string(),
                message: e.to_string(),
            })?;
            let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                ResolveError::Malformed(format!("{}: {}", path.to_string_lossy(), e))
            })?;

            let is_single = value.get("name").map_or(false, |n| n.is_string());
            if is_single {
                let mut meta: ComponentMetadata = serde_json::from_value(value)?;
                if meta.path.is_empty() {
                    meta.path = path.to_string_lossy().to_string();
                }
                catalog.insert(meta);
            } else {
                for (_, meta) in Catalog::from_json(value)?.components {
                    catalog.components.insert(meta.name.clone(), meta);
                }
            }
        }

        debug!(dir = %dir.display(), components = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Content hash over every entry, stable across insertion order.
    pub fn fingerprint(&self) -> &str {
        self.fingerprint.get_or_init(|| {
            let ordered: BTreeMap<&str, &ComponentMetadata> = self
                .components
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_ref()))
                .collect();
            let mut hasher = Sha256::new();
            for (name, meta) in ordered {
                hasher.update(name.as_bytes());
                hasher.update([0u8]);
                hasher.update(serde_json::to_string(meta).unwrap_or_default().as_bytes());
                hasher.update([0u8]);
            }
            format!("{:x}", hasher.finalize())
        })
    }
}
