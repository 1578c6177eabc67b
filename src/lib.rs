//! # Zenith Component Resolver
//!
//! Inlines every component reference of a page IR into the page itself, so
//! the runtime never sees a component.
//!
//! ## Hygiene Invariants
//!
//! 1. **Instance suffix**: every instantiation in a file gets `_instN`, numbered
//!    in pre-order of the page tree. Top-level script locals of the component
//!    are renamed with it; declared props are not.
//!
//! 2. **Free variables**: identifiers a component does not declare stay as
//!    written, so page state and globals are reachable from inlined code.
//!
//! 3. **One substitution function**: script text, expression text and literal
//!    event-handler attribute values all go through `SymbolTable`, which
//!    respects shadowing by nearer bindings.
//!
//! 4. **No partial output**: `resolve` returns a fully expanded IR or an error.
//!
//! 5. **Slot numbering**: content a caller passes into a component's slots is
//!    resolved as soon as that component's instance is allocated, before the
//!    component's own template. In `<Frame><Leaf /></Frame>` where `Frame`
//!    renders `<Leaf /><slot />`, the caller's `Leaf` is `_inst1` and
//!    `Frame`'s own `Leaf` is `_inst2`, regardless of where `<slot>` sits.
//!
//! ## Pipeline
//!
//! `validate_source` → `resolve` → `validate_resolved` → `emit_module`, driven
//! by `compile_page` / `compile_pages`, optionally through `ResolutionCache`.

mod cache;
mod catalog;
mod codegen;
mod compile;
mod component;
mod error;
mod finalize;
mod ir;
mod renamer;
mod scope;
mod validate;
mod visitor;

#[cfg(test)]
mod pipeline_tests;

pub use cache::ResolutionCache;
pub use catalog::{collect_slots, Catalog, ComponentMetadata, Lookup, SlotDefinition};
pub use codegen::{emit_module, EmittedModule, ScriptImport};
pub use compile::{
    compile_page, compile_page_json, compile_pages, resolve_checked, resolve_components_json,
    validate_ir_json, CompileOptions, CompileOutput, MissingPropPolicy,
};
pub use component::{resolve, resolve_with};
pub use error::{ResolveError, Result};
pub use finalize::{plan_bundle, BundlePlan, VirtualModule};
pub use ir::*;
pub use renamer::SymbolTable;
pub use validate::{
    validate_component, validate_precompiled, validate_resolved, validate_source, CompilerError,
    Invariant,
};
pub use visitor::TemplateVisitor;

#[cfg(feature = "napi")]
pub use compile::{compile_page_native, resolve_components_native, validate_ir_native};

#[cfg(feature = "napi")]
#[napi_derive::napi]
pub fn compile_bridge() -> String {
    "Zenith Resolver Bridge Connected".to_string()
}
