//! Bundle plan handed to the host bundler when the emitted module pulls in
//! npm packages.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::codegen::ScriptImport;

pub const CONTENT_MODULE_ID: &str = "\0zenith:content";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct VirtualModule {
    pub id: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct BundlePlan {
    pub entry: String,
    pub platform: String,
    pub format: String,
    pub resolve_roots: Vec<String>,
    pub virtual_modules: Vec<VirtualModule>,
}

/// `Some` only when at least one value import is a bare specifier.
pub fn plan_bundle(file_path: &str, imports: &[ScriptImport], entry: &str) -> Option<BundlePlan> {
    let bare: Vec<&str> = imports
        .iter()
        .filter(|imp| !imp.type_only && imp.is_bare())
        .map(|imp| imp.source.as_str())
        .collect();
    if bare.is_empty() {
        return None;
    }
    debug!(file = file_path, packages = ?bare, "bundle plan required");

    Some(BundlePlan {
        entry: entry.to_string(),
        platform: "browser".to_string(),
        format: "esm".to_string(),
        resolve_roots: vec![resolve_root(file_path)],
        virtual_modules: vec![VirtualModule {
            id: CONTENT_MODULE_ID.to_string(),
            code: "export const zenCollection = (typeof globalThis !== 'undefined' ? globalThis : window).zenCollection;".to_string(),
        }],
    })
}

fn resolve_root(file_path: &str) -> String {
    let parent = Path::new(file_path)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    if parent.is_empty() {
        ".".to_string()
    } else {
        parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(source: &str, type_only: bool) -> ScriptImport {
        ScriptImport {
            source: source.to_string(),
            specifiers: "{ x }".to_string(),
            type_only,
            side_effect: false,
        }
    }

    #[test]
    fn test_no_plan_for_relative_imports() {
        let imports = vec![import("./util.js", false), import("/abs/mod.js", false)];
        assert!(plan_bundle("src/pages/index.zen", &imports, "code").is_none());
        assert!(plan_bundle("src/pages/index.zen", &[], "code").is_none());
    }

    #[test]
    fn test_type_only_bare_imports_do_not_trigger() {
        let imports = vec![import("some-types", true)];
        assert!(plan_bundle("index.zen", &imports, "code").is_none());
    }

    #[test]
    fn test_plan_for_bare_imports() {
        let imports = vec![import("./util.js", false), import("date-fns", false)];
        let plan = plan_bundle("src/pages/index.zen", &imports, "entry code").unwrap();
        assert_eq!(plan.entry, "entry code");
        assert_eq!(plan.platform, "browser");
        assert_eq!(plan.format, "esm");
        assert_eq!(plan.resolve_roots, vec!["src/pages".to_string()]);
        assert_eq!(plan.virtual_modules[0].id, CONTENT_MODULE_ID);
    }

    #[test]
    fn test_resolve_root_falls_back_to_cwd() {
        let plan = plan_bundle("index.zen", &[import("lodash", false)], "").unwrap();
        assert_eq!(plan.resolve_roots, vec![".".to_string()]);
    }
}
