//! Worker modules for layout
//!
//! Two modules share the flex worker:
//!
//! - `text_metrics`: owns the worker's [`FontStore`]; calling it loads font
//!   bytes by family name or file path
//! - `flex_layout`: depends on `text_metrics` and runs [`process_flex_layout`]
//!   against the preloaded fonts
//!
//! Both are defined once per process and registered lazily on first call.

use std::sync::OnceLock;

use serde_json::Value;
use troika_worker::{
    define_worker_module, ModuleDeps, ModuleInstance, Thenable, TypedWorkerModule, WorkerId,
    WorkerModuleOptions, WorkerRegistry,
};

use crate::layout::{process_flex_layout, LayoutResult};
use crate::measure::{FontStore, ShapedTextMeasurer};
use crate::style::StyleNode;

/// Worker thread hosting layout and text measurement
pub const FLEX_WORKER: WorkerId = WorkerId("troika-flex");

fn init_text_metrics(_deps: &ModuleDeps) -> Result<ModuleInstance, String> {
    let fonts = FontStore::default();
    let store = fonts.clone();
    Ok(ModuleInstance::function(move |args: Value| {
        let names: Vec<String> = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let loaded = store.preload(names).map_err(|e| e.to_string())?;
        serde_json::to_value(loaded).map_err(|e| e.to_string())
    })
    .with_service(fonts))
}

fn init_flex_layout(deps: &ModuleDeps) -> Result<ModuleInstance, String> {
    let fonts = deps.service::<FontStore>(0)?;
    Ok(ModuleInstance::function(move |args: Value| {
        let root: StyleNode = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let result = fonts
            .read(|registry| process_flex_layout(&root, &ShapedTextMeasurer::new(registry)))
            .map_err(|e| e.to_string())?;
        serde_json::to_value(result).map_err(|e| e.to_string())
    }))
}

/// Preloads fonts; returns every loaded font name
pub fn text_metrics_module() -> &'static TypedWorkerModule<Vec<String>, Vec<String>> {
    static MODULE: OnceLock<TypedWorkerModule<Vec<String>, Vec<String>>> = OnceLock::new();
    MODULE.get_or_init(|| {
        TypedWorkerModule::new(define_worker_module(
            WorkerModuleOptions::new("text_metrics", init_text_metrics).worker(FLEX_WORKER),
        ))
    })
}

/// Computes a [`LayoutResult`] for a [`StyleNode`] tree
pub fn flex_layout_module() -> &'static TypedWorkerModule<StyleNode, LayoutResult> {
    static MODULE: OnceLock<TypedWorkerModule<StyleNode, LayoutResult>> = OnceLock::new();
    MODULE.get_or_init(|| {
        TypedWorkerModule::new(define_worker_module(
            WorkerModuleOptions::new("flex_layout", init_flex_layout)
                .worker(FLEX_WORKER)
                .dependency(text_metrics_module().module()),
        ))
    })
}

pub fn preload_fonts(registry: &WorkerRegistry, fonts: Vec<String>) -> Thenable<Vec<String>> {
    text_metrics_module().call(registry, &fonts)
}

/// Preload `fonts`, then lay out `root` once they are available
pub fn request_layout(registry: &WorkerRegistry, root: StyleNode, fonts: Vec<String>) -> Thenable<LayoutResult> {
    if fonts.is_empty() {
        return flex_layout_module().call(registry, &root);
    }
    let registry_handle = registry.clone();
    preload_fonts(registry, fonts).and_then(move |_| flex_layout_module().call(&registry_handle, &root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlexError;
    use crate::layout::ComputedBox;
    use std::time::Duration;
    use troika_worker::{RegistryConfig, WorkerError};

    fn labelled_tree(font: &str) -> StyleNode {
        let mut label = StyleNode::new("label");
        label.text = Some("hi".to_string());
        label.font = Some(font.to_string());
        let mut root = StyleNode::new("root");
        root.width = Some(100.0.into());
        root.height = Some(20.0.into());
        root.children.push(label);
        root
    }

    #[test]
    fn test_layout_on_main_thread_fallback() {
        let registry = WorkerRegistry::new(RegistryConfig::main_thread());
        let result = request_layout(&registry, labelled_tree("Inter"), vec!["Inter".to_string()]);
        assert!(result.is_pending());
        registry.pump();

        let layout = result.try_result().unwrap().unwrap();
        assert_eq!(
            layout.get("root"),
            Some(&ComputedBox {
                left: 0.0,
                top: 0.0,
                width: 100.0,
                height: 20.0
            })
        );
        assert!(layout.get("label").is_some());
    }

    #[test]
    fn test_missing_font_rejects_layout() {
        let registry = WorkerRegistry::new(RegistryConfig::main_thread());
        let result = flex_layout_module().call(&registry, &labelled_tree("Missing"));
        registry.pump();

        match result.try_result() {
            Some(Err(WorkerError::Call { module, message })) => {
                assert_eq!(module, "flex_layout");
                assert_eq!(message, FlexError::FontNotLoaded("Missing".to_string()).to_string());
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_layout_on_worker_thread() {
        let registry = WorkerRegistry::new(RegistryConfig::default());
        let result = request_layout(&registry, labelled_tree("Inter"), vec!["Inter".to_string()]);
        let layout = pollster::block_on(async {
            // The worker thread answers while this thread pumps
            assert!(registry.wait_idle(Duration::from_secs(10)));
            result.await
        })
        .unwrap();
        assert_eq!(layout.len(), 2);
    }
}
