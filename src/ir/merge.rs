//! Combine independently compiled IR fragments into one module.

use std::collections::HashSet;

use super::{IRInitialState, IRMetadata, IRModule, IRSourceMap};

/// Module name used when the caller does not supply one.
pub const MERGED_MODULE_NAME: &str = "merged";

/// Concatenate `fragments` in order. Every component, rule, function and
/// entity gets a fresh sequential id; the fragments' own ids are discarded.
/// Choice points keep the first occurrence of each id, in input order.
pub fn merge_modules(fragments: &[IRModule], name: Option<&str>) -> IRModule {
    let mut merged = IRModule::empty(name.unwrap_or(MERGED_MODULE_NAME));
    let mut entities = Vec::new();
    let mut choice_points = Vec::new();
    let mut seen_choice_points = HashSet::new();
    let mut source_files = Vec::new();
    let mut sources = Vec::new();

    for fragment in fragments {
        merged.components.extend(fragment.components.iter().cloned());
        merged.rules.extend(fragment.rules.iter().cloned());
        merged.functions.extend(fragment.functions.iter().cloned());
        entities.extend(fragment.entities().iter().cloned());
        choice_points.extend(
            fragment
                .choice_points()
                .iter()
                .filter(|point| seen_choice_points.insert(point.id.clone()))
                .cloned(),
        );
        if let Some(metadata) = &fragment.metadata {
            source_files.extend(metadata.source_files.iter().cloned());
        }
        if let Some(source_map) = &fragment.source_map {
            sources.extend(source_map.files.iter().cloned());
        }
    }

    for (id, component) in (0..).zip(merged.components.iter_mut()) {
        component.id = id;
    }
    for (id, rule) in (0..).zip(merged.rules.iter_mut()) {
        rule.id = id;
    }
    for (id, function) in (0..).zip(merged.functions.iter_mut()) {
        function.id = id;
    }
    for (id, entity) in (0..).zip(entities.iter_mut()) {
        entity.id = id;
    }

    tracing::debug!(
        fragments = fragments.len(),
        components = merged.components.len(),
        rules = merged.rules.len(),
        functions = merged.functions.len(),
        entities = entities.len(),
        "merged IR fragments"
    );

    merged.metadata = Some(IRMetadata {
        compiler_version: env!("CARGO_PKG_VERSION").to_string(),
        source_files,
    });
    merged.initial_state = (!entities.is_empty()).then_some(IRInitialState { entities });
    merged.choice_points = (!choice_points.is_empty()).then_some(choice_points);
    merged.source_map = (!sources.is_empty()).then_some(IRSourceMap { files: sources });
    merged
}
