//! Pipeline entry points: validate → resolve → validate → emit, for one page
//! or many, plus the JSON bridge the host process calls.

#[cfg(feature = "napi")]
use napi_derive::napi;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::cache::ResolutionCache;
use crate::catalog::Catalog;
use crate::codegen::{emit_module, EmittedModule};
use crate::component::resolve_with;
use crate::error::ResolveError;
use crate::finalize::{plan_bundle, BundlePlan};
use crate::ir::ZenIR;
#[cfg(feature = "napi")]
use crate::validate::CompilerError;
use crate::validate::{validate_resolved, validate_source};

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// What to substitute for a declared prop the caller did not pass and the
/// script gives no default for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum MissingPropPolicy {
    /// Leave the identifier as written.
    #[default]
    PassThrough,
    /// Substitute the literal `undefined`.
    Undefined,
    /// Fail with `ResolveError::MissingProp`.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    pub missing_prop_policy: MissingPropPolicy,
    /// Run the invariant passes before and after resolution.
    pub validate: bool,
    /// Run the component-level pass on each component at first use.
    pub strict_props: bool,
    pub forward_attributes: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            missing_prop_policy: MissingPropPolicy::PassThrough,
            validate: true,
            strict_props: false,
            forward_attributes: true,
        }
    }
}

impl CompileOptions {
    /// Stable rendering for cache keys.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(json: Option<&str>) -> Result<Self, ResolveError> {
        match json.map(str::trim) {
            None | Some("") | Some("null") => Ok(CompileOptions::default()),
            Some(text) => Ok(serde_json::from_str(text)?),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOutput {
    pub ir: ZenIR,
    pub module: EmittedModule,
    #[serde(default)]
    pub bundle_plan: Option<BundlePlan>,
}

/// Resolution wrapped in the pre- and post-resolution invariant passes.
pub fn resolve_checked(
    page: ZenIR,
    catalog: &Catalog,
    options: &CompileOptions,
) -> Result<ZenIR, ResolveError> {
    if options.validate {
        validate_source(&page, catalog)?;
    }
    let resolved = resolve_with(page, catalog, options)?;
    if options.validate {
        validate_resolved(&resolved)?;
    }
    Ok(resolved)
}

#[instrument(skip_all, fields(file = %page.file_path))]
pub fn compile_page(
    page: ZenIR,
    catalog: &Catalog,
    options: &CompileOptions,
) -> Result<CompileOutput, ResolveError> {
    let ir = resolve_checked(page, catalog, options)?;
    let module = emit_module(&ir)?;
    let bundle_plan = plan_bundle(&ir.file_path, &module.imports, &module.code);

    debug!(
        expressions = ir.template.expressions.len(),
        states = ir.all_states.len(),
        bundled = bundle_plan.is_some(),
        "compiled page"
    );
    Ok(CompileOutput {
        ir,
        module,
        bundle_plan,
    })
}

/// Compile pages in parallel. Results follow input order.
pub fn compile_pages(
    pages: Vec<ZenIR>,
    catalog: &Catalog,
    options: &CompileOptions,
    cache: Option<&ResolutionCache>,
) -> Vec<Result<Arc<CompileOutput>, ResolveError>> {
    pages
        .into_par_iter()
        .map(|page| match cache {
            Some(cache) => cache.compile(&page, catalog, options),
            None => compile_page(page, catalog, options).map(Arc::new),
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSON BRIDGE
// ═══════════════════════════════════════════════════════════════════════════════

fn parse_inputs(ir_json: &str, catalog_json: &str) -> Result<(ZenIR, Catalog), ResolveError> {
    let page: ZenIR = serde_json::from_str(ir_json)?;
    let catalog = Catalog::from_json(serde_json::from_str(catalog_json)?)?;
    Ok((page, catalog))
}

fn guard<T>(f: impl FnOnce() -> Result<T, ResolveError>) -> Result<T, ResolveError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic during resolution".to_string());
            Err(ResolveError::Bridge(message))
        }
    }
}

/// Resolve a page IR given as JSON; returns the resolved IR as JSON.
pub fn resolve_components_json(
    ir_json: &str,
    catalog_json: &str,
    options_json: Option<&str>,
) -> Result<String, ResolveError> {
    let (page, catalog) = parse_inputs(ir_json, catalog_json)?;
    let options = CompileOptions::from_json(options_json)?;
    let resolved = guard(|| resolve_checked(page, &catalog, &options))?;
    Ok(serde_json::to_string(&resolved)?)
}

/// Run the post-resolution invariant pass over an IR given as JSON.
pub fn validate_ir_json(ir_json: &str) -> Result<(), ResolveError> {
    let ir: ZenIR = serde_json::from_str(ir_json)?;
    guard(|| Ok(validate_resolved(&ir)?))
}

pub fn compile_page_json(
    ir_json: &str,
    catalog_json: &str,
    options_json: Option<&str>,
) -> Result<String, ResolveError> {
    let (page, catalog) = parse_inputs(ir_json, catalog_json)?;
    let options = CompileOptions::from_json(options_json)?;
    let output = guard(|| compile_page(page, &catalog, &options))?;
    Ok(serde_json::to_string(&output)?)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn resolve_components_native(
    ir_json: String,
    catalog_json: String,
    options_json: Option<String>,
) -> napi::Result<String> {
    Ok(resolve_components_json(&ir_json, &catalog_json, options_json.as_deref())?)
}

/// `None` when the IR upholds every invariant.
#[cfg(feature = "napi")]
#[napi]
pub fn validate_ir_native(ir_json: String) -> napi::Result<Option<CompilerError>> {
    match validate_ir_json(&ir_json) {
        Ok(()) => Ok(None),
        Err(ResolveError::Invariant(err)) => Ok(Some(err)),
        Err(other) => Err(other.into()),
    }
}

#[cfg(feature = "napi")]
#[napi]
pub fn compile_page_native(
    ir_json: String,
    catalog_json: String,
    options_json: Option<String>,
) -> napi::Result<String> {
    Ok(compile_page_json(&ir_json, &catalog_json, options_json.as_deref())?)
}
