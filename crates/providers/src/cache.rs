//! Prompt-cache annotation (SPEC_FULL §4.3).
//!
//! No teacher precedent exists for this (grepped the providers crate clean
//! of `cache_control`/`ephemeral`); designed fresh, following the shape of
//! the adapters' `build_*_body` functions that assemble a fresh, owned JSON
//! wire body per request. Annotation therefore always happens on a value
//! the adapter itself just built — never on the caller's `Message`s, which
//! this module never even sees.
//!
//! Only Anthropic-style ephemeral caching is modeled; this is the only
//! provider family in the adapter set that exposes it.

use serde_json::{json, Value};

/// Mark `cache_control={type:"ephemeral"}` on the last content part of
/// each of the first two entries in `system`, and the last two entries in
/// `messages`. Each entry is expected to have a `"content"` field holding
/// a JSON array of content-part objects; entries that don't match this
/// shape are left untouched.
pub(crate) fn annotate_ephemeral_cache(system: &mut [Value], messages: &mut [Value]) {
    let system_len = system.len();
    for entry in system.iter_mut().take(2.min(system_len)) {
        mark_last_part(entry);
    }

    let start = messages.len().saturating_sub(2);
    for entry in messages.iter_mut().skip(start) {
        mark_last_part(entry);
    }
}

fn mark_last_part(entry: &mut Value) {
    let Some(content) = entry.get_mut("content").and_then(Value::as_array_mut) else {
        return;
    };
    if let Some(last) = content.last_mut() {
        if let Some(obj) = last.as_object_mut() {
            obj.insert("cache_control".into(), json!({"type": "ephemeral"}));
        }
    }
}
