//! Actionability checks: the preconditions an element must satisfy before a
//! simulated user action will be reliable.
//!
//! Each check is a self-contained DOM script taking a CSS selector and
//! returning a JSON string: `{<flag>: bool, reason?}` on success, or
//! `{error: "not found"}` when the selector matches nothing.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::{sleep, Duration};

use crate::bidi::Bidi;
use crate::{Error, Result};

/// Element bounding box in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Center point, truncated to integer device coordinates.
    pub fn center(&self) -> (i64, i64) {
        (
            (self.x + self.width / 2.0) as i64,
            (self.y + self.height / 2.0) as i64,
        )
    }
}

/// One actionability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Visible,
    Stable,
    ReceivesEvents,
    Enabled,
    Editable,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Check::Visible => "Visible",
            Check::Stable => "Stable",
            Check::ReceivesEvents => "ReceivesEvents",
            Check::Enabled => "Enabled",
            Check::Editable => "Editable",
        };
        f.write_str(name)
    }
}

/// Checks required before clicking an element.
pub const CLICK_CHECKS: &[Check] = &[
    Check::Visible,
    Check::Stable,
    Check::ReceivesEvents,
    Check::Enabled,
];

/// Checks required before typing into an element.
pub const TYPE_CHECKS: &[Check] = &[
    Check::Visible,
    Check::Stable,
    Check::ReceivesEvents,
    Check::Enabled,
    Check::Editable,
];

/// All five check results for one element.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actionability {
    pub visible: bool,
    pub stable: bool,
    pub receives_events: bool,
    pub enabled: bool,
    pub editable: bool,
}

/// Gap between the two samples of the stability check.
const STABLE_SAMPLE_GAP: Duration = Duration::from_millis(50);

const VISIBLE_JS: &str = r#"
    (selector) => {
        const el = document.querySelector(selector);
        if (!el) return JSON.stringify({ error: 'not found' });

        const rect = el.getBoundingClientRect();
        if (rect.width === 0 || rect.height === 0) {
            return JSON.stringify({ visible: false, reason: 'zero size' });
        }

        const style = window.getComputedStyle(el);
        if (style.visibility === 'hidden') {
            return JSON.stringify({ visible: false, reason: 'visibility hidden' });
        }
        if (style.display === 'none') {
            return JSON.stringify({ visible: false, reason: 'display none' });
        }

        return JSON.stringify({ visible: true });
    }
"#;

const RECEIVES_EVENTS_JS: &str = r#"
    (selector) => {
        const el = document.querySelector(selector);
        if (!el) return JSON.stringify({ error: 'not found' });

        const rect = el.getBoundingClientRect();
        const centerX = rect.x + rect.width / 2;
        const centerY = rect.y + rect.height / 2;

        const hitTarget = document.elementFromPoint(centerX, centerY);
        if (!hitTarget) {
            return JSON.stringify({ receivesEvents: false, reason: 'no element at point' });
        }

        if (el === hitTarget || el.contains(hitTarget)) {
            return JSON.stringify({ receivesEvents: true });
        }

        return JSON.stringify({
            receivesEvents: false,
            reason: 'obscured by ' + hitTarget.tagName.toLowerCase()
        });
    }
"#;

const ENABLED_JS: &str = r#"
    (selector) => {
        const el = document.querySelector(selector);
        if (!el) return JSON.stringify({ error: 'not found' });

        if (el.disabled === true) {
            return JSON.stringify({ enabled: false, reason: 'disabled attribute' });
        }

        if (el.getAttribute('aria-disabled') === 'true') {
            return JSON.stringify({ enabled: false, reason: 'aria-disabled' });
        }

        const fieldset = el.closest('fieldset[disabled]');
        if (fieldset) {
            const legend = fieldset.querySelector('legend');
            if (!legend || !legend.contains(el)) {
                return JSON.stringify({ enabled: false, reason: 'inside disabled fieldset' });
            }
        }

        return JSON.stringify({ enabled: true });
    }
"#;

const EDITABLE_JS: &str = r#"
    (selector) => {
        const el = document.querySelector(selector);
        if (!el) return JSON.stringify({ error: 'not found' });

        if (el.readOnly === true) {
            return JSON.stringify({ editable: false, reason: 'readonly attribute' });
        }

        if (el.getAttribute('aria-readonly') === 'true') {
            return JSON.stringify({ editable: false, reason: 'aria-readonly' });
        }

        const tag = el.tagName.toLowerCase();
        if (tag === 'input') {
            const type = (el.type || 'text').toLowerCase();
            const textTypes = ['text', 'password', 'email', 'number', 'search', 'tel', 'url'];
            if (!textTypes.includes(type)) {
                return JSON.stringify({ editable: false, reason: 'input type ' + type + ' not editable' });
            }
        }

        if (el.isContentEditable) {
            return JSON.stringify({ editable: true });
        }

        if (tag === 'input' || tag === 'textarea') {
            return JSON.stringify({ editable: true });
        }

        return JSON.stringify({ editable: false, reason: 'not a form element or contenteditable' });
    }
"#;

const BOUNDING_BOX_JS: &str = r#"
    (selector) => {
        const el = document.querySelector(selector);
        if (!el) return JSON.stringify({ error: 'not found' });

        const rect = el.getBoundingClientRect();
        return JSON.stringify({
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height
        });
    }
"#;

/// Element has a non-empty box, `visibility != hidden`, `display != none`.
/// Opacity is deliberately not tested.
pub async fn check_visible(bidi: &dyn Bidi, context: &str, selector: &str) -> Result<bool> {
    let raw = call_selector_function(bidi, context, selector, VISIBLE_JS).await?;
    parse_flag(&raw, "visible")
}

/// Bounding box unchanged across two samples 50 ms apart. If the box moved
/// or resized between the samples, the element is animating.
pub async fn check_stable(bidi: &dyn Bidi, context: &str, selector: &str) -> Result<bool> {
    let first = bounding_box(bidi, context, selector).await?;
    sleep(STABLE_SAMPLE_GAP).await;
    let second = bounding_box(bidi, context, selector).await?;
    // Exact comparison: any flux at all means not stable.
    Ok(first == second)
}

/// `elementFromPoint` at the element's center hits the element itself or a
/// descendant.
pub async fn check_receives_events(bidi: &dyn Bidi, context: &str, selector: &str) -> Result<bool> {
    let raw = call_selector_function(bidi, context, selector, RECEIVES_EVENTS_JS).await?;
    parse_flag(&raw, "receivesEvents")
}

/// Not disabled natively, via `aria-disabled`, or through an enclosing
/// `fieldset[disabled]` (first-legend contents excepted).
pub async fn check_enabled(bidi: &dyn Bidi, context: &str, selector: &str) -> Result<bool> {
    let raw = call_selector_function(bidi, context, selector, ENABLED_JS).await?;
    parse_flag(&raw, "enabled")
}

/// Enabled, not read-only, and a text-accepting element.
pub async fn check_editable(bidi: &dyn Bidi, context: &str, selector: &str) -> Result<bool> {
    if !check_enabled(bidi, context, selector).await? {
        return Ok(false);
    }
    let raw = call_selector_function(bidi, context, selector, EDITABLE_JS).await?;
    parse_flag(&raw, "editable")
}

/// Run one check by kind.
pub async fn run_check(
    bidi: &dyn Bidi,
    context: &str,
    selector: &str,
    check: Check,
) -> Result<bool> {
    match check {
        Check::Visible => check_visible(bidi, context, selector).await,
        Check::Stable => check_stable(bidi, context, selector).await,
        Check::ReceivesEvents => check_receives_events(bidi, context, selector).await,
        Check::Enabled => check_enabled(bidi, context, selector).await,
        Check::Editable => check_editable(bidi, context, selector).await,
    }
}

/// Run all five checks and report each result.
pub async fn check_all(bidi: &dyn Bidi, context: &str, selector: &str) -> Result<Actionability> {
    Ok(Actionability {
        visible: check_visible(bidi, context, selector).await?,
        stable: check_stable(bidi, context, selector).await?,
        receives_events: check_receives_events(bidi, context, selector).await?,
        enabled: check_enabled(bidi, context, selector).await?,
        editable: check_editable(bidi, context, selector).await?,
    })
}

/// Current bounding box of the element.
pub async fn bounding_box(bidi: &dyn Bidi, context: &str, selector: &str) -> Result<BoundingBox> {
    let raw = call_selector_function(bidi, context, selector, BOUNDING_BOX_JS).await?;
    let value: Value = serde_json::from_str(&raw)
        .map_err(|e| Error::Protocol(format!("bad bounding box payload: {e}")))?;
    if value.get("error").is_some() {
        return Err(Error::ElementNotFound);
    }
    serde_json::from_value(value).map_err(|e| Error::Protocol(format!("bad bounding box: {e}")))
}

/// Invoke a DOM script that takes a selector and stringifies its result.
///
/// The `script.callFunction` response nests the remote value as
/// `{type, result: {type, value}}`; predicate scripts always return strings,
/// and a `null` remote value means the element vanished.
pub(crate) async fn call_selector_function(
    bidi: &dyn Bidi,
    context: &str,
    selector: &str,
    script: &str,
) -> Result<String> {
    let params = json!({
        "functionDeclaration": script,
        "target": { "context": context },
        "arguments": [ { "type": "string", "value": selector } ],
        "awaitPromise": false,
        "resultOwnership": "root",
    });
    let result = bidi.call("script.callFunction", params).await?;

    if result.get("type").and_then(Value::as_str) == Some("exception") {
        let details = result.get("exceptionDetails").cloned().unwrap_or(Value::Null);
        return Err(Error::Protocol(format!("script exception: {details}")));
    }

    let remote = result
        .get("result")
        .ok_or_else(|| Error::Protocol(format!("callFunction result without value: {result}")))?;
    match remote.get("type").and_then(Value::as_str) {
        Some("string") => Ok(remote
            .get("value")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()),
        Some("null") | Some("undefined") => Err(Error::ElementNotFound),
        other => Err(Error::Protocol(format!(
            "expected string remote value, got {other:?}"
        ))),
    }
}

/// Read one boolean flag out of a check payload, mapping the not-found
/// envelope to [`Error::ElementNotFound`].
fn parse_flag(raw: &str, field: &str) -> Result<bool> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| Error::Protocol(format!("bad check payload: {e}")))?;
    if value.get("error").is_some() {
        return Err(Error::ElementNotFound);
    }
    Ok(value.get(field).and_then(Value::as_bool).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flag_reads_the_named_field() {
        assert!(parse_flag(r#"{"visible": true}"#, "visible").unwrap());
        assert!(!parse_flag(r#"{"visible": false, "reason": "zero size"}"#, "visible").unwrap());
    }

    #[test]
    fn parse_flag_maps_not_found() {
        assert!(matches!(
            parse_flag(r#"{"error": "not found"}"#, "enabled"),
            Err(Error::ElementNotFound)
        ));
    }

    #[test]
    fn parse_flag_rejects_garbage() {
        assert!(matches!(
            parse_flag("not json", "visible"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn center_truncates_toward_zero() {
        let bbox = BoundingBox {
            x: 10.5,
            y: 20.25,
            width: 101.0,
            height: 33.5,
        };
        assert_eq!(bbox.center(), (61, 37));
    }

    #[test]
    fn check_names_match_reporting() {
        let names: Vec<String> = TYPE_CHECKS.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            names,
            ["Visible", "Stable", "ReceivesEvents", "Enabled", "Editable"]
        );
    }
}
