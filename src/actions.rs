//! High-level browser actions composing the BiDi channel, the actionability
//! checks, and the waiter.
//!
//! Every action takes an optional browsing context; when none is given the
//! first top-level context from `browsingContext.getTree` is used.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::actionability::{self, BoundingBox};
use crate::bidi::Bidi;
use crate::wait::{self, WaitOptions};
use crate::{Error, Result};

/// An element located by `find`: tag name, leading text, and box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementInfo {
    pub tag: String,
    pub text: String,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

/// Result of a navigation.
#[derive(Debug, Clone, Deserialize)]
pub struct NavigateResult {
    pub url: String,
    #[serde(default)]
    pub navigation: Option<String>,
}

const FIND_ELEMENT_JS: &str = r#"
    (selector) => {
        const el = document.querySelector(selector);
        if (!el) return null;
        const rect = el.getBoundingClientRect();
        return JSON.stringify({
            tag: el.tagName,
            text: (el.textContent || '').trim().substring(0, 100),
            box: {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height
            }
        });
    }
"#;

const ELEMENT_VALUE_JS: &str = r#"
    (selector) => {
        const el = document.querySelector(selector);
        if (!el) return JSON.stringify({ error: 'not found' });
        return JSON.stringify({ value: el.value !== undefined ? String(el.value) : '' });
    }
"#;

/// Resolve the browsing context to act in: the caller's, or the first
/// top-level context in the tree.
pub async fn resolve_context(bidi: &dyn Bidi, context: Option<&str>) -> Result<String> {
    if let Some(ctx) = context {
        if !ctx.is_empty() {
            return Ok(ctx.to_string());
        }
    }

    #[derive(Deserialize)]
    struct Tree {
        #[serde(default)]
        contexts: Vec<TreeContext>,
    }
    #[derive(Deserialize)]
    struct TreeContext {
        context: String,
    }

    let result = bidi
        .call("browsingContext.getTree", Value::Object(Default::default()))
        .await?;
    let tree: Tree = serde_json::from_value(result)
        .map_err(|e| Error::Protocol(format!("unexpected getTree result: {e}")))?;
    tree.contexts
        .into_iter()
        .next()
        .map(|c| c.context)
        .ok_or(Error::NoContext)
}

/// Navigate and wait for the load to complete.
pub async fn navigate(bidi: &dyn Bidi, context: &str, url: &str) -> Result<NavigateResult> {
    let result = bidi
        .call(
            "browsingContext.navigate",
            json!({ "context": context, "url": url, "wait": "complete" }),
        )
        .await?;
    serde_json::from_value(result)
        .map_err(|e| Error::Protocol(format!("unexpected navigate result: {e}")))
}

/// Evaluate a JavaScript expression and return its remote value.
pub async fn evaluate(bidi: &dyn Bidi, context: &str, expression: &str) -> Result<Value> {
    let result = bidi
        .call(
            "script.evaluate",
            json!({
                "expression": expression,
                "target": { "context": context },
                "awaitPromise": false,
                "resultOwnership": "root",
            }),
        )
        .await?;
    if result.get("type").and_then(Value::as_str) == Some("exception") {
        let details = result.get("exceptionDetails").cloned().unwrap_or(Value::Null);
        return Err(Error::Protocol(format!("script exception: {details}")));
    }
    Ok(result
        .pointer("/result/value")
        .cloned()
        .unwrap_or(Value::Null))
}

/// Locate an element right now (no waiting).
pub async fn find_element(bidi: &dyn Bidi, context: &str, selector: &str) -> Result<ElementInfo> {
    let raw =
        actionability::call_selector_function(bidi, context, selector, FIND_ELEMENT_JS).await?;
    serde_json::from_str(&raw).map_err(|e| Error::Protocol(format!("bad element payload: {e}")))
}

/// Wait for the element to be click-actionable, then click its center.
pub async fn click(
    bidi: &dyn Bidi,
    context: &str,
    selector: &str,
    opts: WaitOptions,
) -> Result<()> {
    wait::wait_for_click(bidi, context, selector, opts).await?;
    let bbox = actionability::bounding_box(bidi, context, selector).await?;
    let (x, y) = bbox.center();
    bidi.call("input.performActions", pointer_click_params(context, x, y))
        .await?;
    Ok(())
}

/// Wait for the element to be type-actionable, focus it with a click, then
/// send one key down/up pair per code point.
pub async fn type_text(
    bidi: &dyn Bidi,
    context: &str,
    selector: &str,
    text: &str,
    opts: WaitOptions,
) -> Result<()> {
    wait::wait_for_type(bidi, context, selector, opts).await?;
    let bbox = actionability::bounding_box(bidi, context, selector).await?;
    let (x, y) = bbox.center();
    bidi.call("input.performActions", pointer_click_params(context, x, y))
        .await?;
    bidi.call(
        "input.performActions",
        json!({
            "context": context,
            "actions": [{
                "type": "key",
                "id": "keyboard",
                "actions": key_actions(text),
            }],
        }),
    )
    .await?;
    Ok(())
}

/// Capture a screenshot of the context, decoded from base64 to PNG bytes.
pub async fn screenshot(bidi: &dyn Bidi, context: &str) -> Result<Vec<u8>> {
    let result = bidi
        .call(
            "browsingContext.captureScreenshot",
            json!({ "context": context }),
        )
        .await?;
    let data = result
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Protocol("screenshot result without data".to_string()))?;
    BASE64
        .decode(data)
        .map_err(|e| Error::Protocol(format!("bad screenshot encoding: {e}")))
}

/// Read `el.value`, for verifying what a type action produced.
pub async fn element_value(bidi: &dyn Bidi, context: &str, selector: &str) -> Result<String> {
    let raw =
        actionability::call_selector_function(bidi, context, selector, ELEMENT_VALUE_JS).await?;
    let value: Value = serde_json::from_str(&raw)
        .map_err(|e| Error::Protocol(format!("bad value payload: {e}")))?;
    if value.get("error").is_some() {
        return Err(Error::ElementNotFound);
    }
    Ok(value
        .get("value")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}

/// URL of the context, read from the browsing context tree.
pub async fn current_url(bidi: &dyn Bidi, context: &str) -> Result<String> {
    let result = bidi
        .call("browsingContext.getTree", Value::Object(Default::default()))
        .await?;
    let contexts = result
        .get("contexts")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Protocol("getTree result without contexts".to_string()))?;
    contexts
        .iter()
        .find(|c| c.get("context").and_then(Value::as_str) == Some(context))
        .or_else(|| contexts.first())
        .and_then(|c| c.get("url").and_then(Value::as_str))
        .map(str::to_string)
        .ok_or(Error::NoContext)
}

/// A pointer click sequence at `(x, y)`: move, press, release.
fn pointer_click_params(context: &str, x: i64, y: i64) -> Value {
    json!({
        "context": context,
        "actions": [{
            "type": "pointer",
            "id": "mouse",
            "parameters": { "pointerType": "mouse" },
            "actions": [
                { "type": "pointerMove", "x": x, "y": y, "duration": 0 },
                { "type": "pointerDown", "button": 0 },
                { "type": "pointerUp", "button": 0 },
            ],
        }],
    })
}

/// Key down/up pairs, one per code point. Multi-unit code points travel as a
/// single `value` string; combining marks are not merged.
fn key_actions(text: &str) -> Vec<Value> {
    let mut actions = Vec::with_capacity(text.chars().count() * 2);
    for ch in text.chars() {
        let value = ch.to_string();
        actions.push(json!({ "type": "keyDown", "value": value }));
        actions.push(json!({ "type": "keyUp", "value": value }));
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[test]
    fn pointer_params_truncate_center_coordinates() {
        let params = pointer_click_params("ctx-1", 61, 37);
        assert_eq!(params["context"], "ctx-1");
        let source = &params["actions"][0];
        assert_eq!(source["type"], "pointer");
        assert_eq!(source["id"], "mouse");
        assert_eq!(source["parameters"]["pointerType"], "mouse");
        let steps = source["actions"].as_array().unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0]["type"], "pointerMove");
        assert_eq!(steps[0]["x"], 61);
        assert_eq!(steps[0]["y"], 37);
        assert_eq!(steps[0]["duration"], 0);
        assert_eq!(steps[1]["type"], "pointerDown");
        assert_eq!(steps[1]["button"], 0);
        assert_eq!(steps[2]["type"], "pointerUp");
        assert_eq!(steps[2]["button"], 0);
    }

    #[test]
    fn key_actions_pair_down_and_up_per_code_point() {
        let actions = key_actions("hé😀");
        assert_eq!(actions.len(), 6);
        assert_eq!(actions[0]["type"], "keyDown");
        assert_eq!(actions[0]["value"], "h");
        assert_eq!(actions[1]["type"], "keyUp");
        assert_eq!(actions[1]["value"], "h");
        assert_eq!(actions[2]["value"], "é");
        assert_eq!(actions[4]["value"], "😀");
        assert_eq!(actions[5]["type"], "keyUp");
    }

    #[test]
    fn element_info_round_trips_wire_shape() {
        let info: ElementInfo = serde_json::from_str(
            r#"{"tag":"A","text":"hello","box":{"x":8.0,"y":16.0,"width":40.0,"height":18.0}}"#,
        )
        .unwrap();
        assert_eq!(info.tag, "A");
        let out = serde_json::to_value(&info).unwrap();
        assert_eq!(out["box"]["width"], 40.0);
    }

    struct EmptyTree;

    #[async_trait]
    impl Bidi for EmptyTree {
        async fn call(&self, method: &str, _params: Value) -> Result<Value> {
            assert_eq!(method, "browsingContext.getTree");
            Ok(json!({"contexts": []}))
        }
    }

    struct NoCalls;

    #[async_trait]
    impl Bidi for NoCalls {
        async fn call(&self, method: &str, _params: Value) -> Result<Value> {
            panic!("unexpected call to {method}");
        }
    }

    #[tokio::test]
    async fn resolve_context_fails_on_empty_tree() {
        assert!(matches!(
            resolve_context(&EmptyTree, None).await,
            Err(Error::NoContext)
        ));
    }

    #[tokio::test]
    async fn resolve_context_uses_caller_context_without_calling() {
        let ctx = resolve_context(&NoCalls, Some("ctx-42")).await.unwrap();
        assert_eq!(ctx, "ctx-42");
    }

    #[tokio::test]
    async fn resolve_context_treats_empty_string_as_unset() {
        assert!(matches!(
            resolve_context(&EmptyTree, Some("")).await,
            Err(Error::NoContext)
        ));
    }
}
