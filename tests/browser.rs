//! Integration tests against a real browser.
//!
//! These require Chrome for Testing and chromedriver to be installed
//! (`vibium install`). Run with: cargo test --test browser -- --ignored

use std::sync::Arc;

use vibium::browser::{self, LaunchOptions, LaunchedBrowser};
use vibium::{actionability, actions, BidiClient, Error, WaitOptions, WsTransport};

fn driver_available() -> bool {
    browser::paths::chromedriver_path().is_ok()
}

async fn open() -> (LaunchedBrowser, BidiClient, String) {
    let browser = browser::launch(LaunchOptions::default())
        .await
        .expect("Failed to launch browser");
    let transport = WsTransport::connect(browser.websocket_url())
        .await
        .expect("Failed to connect to BiDi");
    let client = BidiClient::new(Arc::new(transport));
    let context = actions::resolve_context(&client, None)
        .await
        .expect("Failed to resolve context");
    (browser, client, context)
}

async fn goto(client: &BidiClient, context: &str, html: &str) {
    let url = format!("data:text/html,{html}");
    actions::navigate(client, context, &url)
        .await
        .expect("Failed to navigate");
}

#[tokio::test]
#[ignore = "requires chromedriver"]
async fn find_reports_tag_text_and_box() {
    if !driver_available() {
        eprintln!("chromedriver not found, skipping test");
        return;
    }

    let (mut browser, client, context) = open().await;
    goto(&client, &context, r#"<a id="x">hello</a>"#).await;

    let info = actions::find_element(&client, &context, "#x")
        .await
        .expect("Failed to find element");
    assert_eq!(info.tag, "A");
    assert_eq!(info.text, "hello");
    assert!(info.bbox.width > 0.0);
    assert!(info.bbox.height > 0.0);
    assert!(info.bbox.x >= 0.0);
    assert!(info.bbox.y >= 0.0);

    browser.close().await;
}

#[tokio::test]
#[ignore = "requires chromedriver"]
async fn find_missing_element_errors() {
    if !driver_available() {
        return;
    }

    let (mut browser, client, context) = open().await;
    goto(&client, &context, "<p>empty</p>").await;

    let result = actions::find_element(&client, &context, "#nope").await;
    assert!(matches!(result, Err(Error::ElementNotFound)));

    browser.close().await;
}

#[tokio::test]
#[ignore = "requires chromedriver"]
async fn type_text_lands_in_input() {
    if !driver_available() {
        return;
    }

    let (mut browser, client, context) = open().await;
    goto(&client, &context, r#"<input id="q">"#).await;

    actions::type_text(&client, &context, "#q", "hi", WaitOptions::default())
        .await
        .expect("Failed to type");

    let value = actions::element_value(&client, &context, "#q")
        .await
        .expect("Failed to read value");
    assert_eq!(value, "hi");

    // The same thing, via script.evaluate.
    let evaluated = actions::evaluate(&client, &context, "document.querySelector('input').value")
        .await
        .expect("Failed to evaluate");
    assert_eq!(evaluated, "hi");

    browser.close().await;
}

#[tokio::test]
#[ignore = "requires chromedriver"]
async fn click_fires_handlers() {
    if !driver_available() {
        return;
    }

    let (mut browser, client, context) = open().await;
    goto(
        &client,
        &context,
        r#"<button id="btn" onclick="this.textContent = 'Clicked!'">Click Me</button>"#,
    )
    .await;

    actions::click(&client, &context, "#btn", WaitOptions::default())
        .await
        .expect("Failed to click");

    let text = actions::evaluate(&client, &context, "document.querySelector('button').textContent")
        .await
        .expect("Failed to evaluate");
    assert_eq!(text, "Clicked!");

    browser.close().await;
}

#[tokio::test]
#[ignore = "requires chromedriver"]
async fn screenshot_produces_png() {
    if !driver_available() {
        return;
    }

    let (mut browser, client, context) = open().await;
    goto(&client, &context, "<h1>shot</h1>").await;

    let png = actions::screenshot(&client, &context)
        .await
        .expect("Failed to capture screenshot");
    assert!(png.len() > 100);
    assert_eq!(&png[0..4], &[0x89, 0x50, 0x4E, 0x47]);

    browser.close().await;
}

#[tokio::test]
#[ignore = "requires chromedriver"]
async fn evaluate_returns_remote_values() {
    if !driver_available() {
        return;
    }

    let (mut browser, client, context) = open().await;
    goto(&client, &context, "<p>math</p>").await;

    let sum = actions::evaluate(&client, &context, "1 + 1")
        .await
        .expect("Failed to evaluate");
    assert_eq!(sum, 2);

    browser.close().await;
}

#[tokio::test]
#[ignore = "requires chromedriver"]
async fn hidden_element_becomes_clickable_after_reveal() {
    if !driver_available() {
        return;
    }

    let (mut browser, client, context) = open().await;
    goto(
        &client,
        &context,
        r#"<button id="late" style="display:none">Go</button>
           <script>
               setTimeout(() => {
                   document.getElementById('late').style.display = 'block';
               }, 300);
           </script>"#,
    )
    .await;

    // Before the reveal the element is present but not visible.
    let initial = actionability::check_all(&client, &context, "#late")
        .await
        .expect("Failed to check");
    assert!(!initial.visible);

    // The waiter rides out the reveal.
    let opts = WaitOptions::with_timeout(std::time::Duration::from_secs(5));
    vibium::wait::wait_for_click(&client, &context, "#late", opts)
        .await
        .expect("element never became clickable");

    browser.close().await;
}

#[tokio::test]
#[ignore = "requires chromedriver"]
async fn overlay_blocks_hit_target_unless_transparent_to_events() {
    if !driver_available() {
        return;
    }

    let (mut browser, client, context) = open().await;
    goto(
        &client,
        &context,
        r#"<button id="under" style="position:absolute;top:10px;left:10px">Under</button>
           <div id="over" style="position:absolute;top:0;left:0;width:200px;height:100px"></div>"#,
    )
    .await;

    let blocked = actionability::check_receives_events(&client, &context, "#under")
        .await
        .expect("Failed to check");
    assert!(!blocked);

    actions::evaluate(
        &client,
        &context,
        "document.getElementById('over').style.pointerEvents = 'none'",
    )
    .await
    .expect("Failed to evaluate");

    let unblocked = actionability::check_receives_events(&client, &context, "#under")
        .await
        .expect("Failed to check");
    assert!(unblocked);

    browser.close().await;
}

#[tokio::test]
#[ignore = "requires chromedriver"]
async fn animating_element_is_not_stable() {
    if !driver_available() {
        return;
    }

    let (mut browser, client, context) = open().await;
    goto(
        &client,
        &context,
        r#"<style>
               @keyframes slide { from { left: 0; } to { left: 500px; } }
               .moving { position: absolute; animation: slide 2s linear infinite; }
           </style>
           <button id="moving" class="moving">Catch me</button>
           <button id="still">Still</button>"#,
    )
    .await;

    let moving = actionability::check_stable(&client, &context, "#moving")
        .await
        .expect("Failed to check");
    assert!(!moving);

    let still = actionability::check_stable(&client, &context, "#still")
        .await
        .expect("Failed to check");
    assert!(still);

    browser.close().await;
}

#[tokio::test]
#[ignore = "requires chromedriver"]
async fn disabled_controls_fail_enabled_and_editable() {
    if !driver_available() {
        return;
    }

    let (mut browser, client, context) = open().await;
    goto(
        &client,
        &context,
        r#"<input id="dead" disabled>
           <input id="frozen" readonly>
           <fieldset disabled>
               <legend><input id="in-legend"></legend>
               <input id="in-body">
           </fieldset>"#,
    )
    .await;

    let dead = actionability::check_all(&client, &context, "#dead")
        .await
        .expect("Failed to check");
    assert!(!dead.enabled);
    assert!(!dead.editable);

    let frozen = actionability::check_all(&client, &context, "#frozen")
        .await
        .expect("Failed to check");
    assert!(frozen.enabled);
    assert!(!frozen.editable);

    // The first legend of a disabled fieldset is exempt.
    assert!(actionability::check_enabled(&client, &context, "#in-legend")
        .await
        .unwrap());
    assert!(!actionability::check_enabled(&client, &context, "#in-body")
        .await
        .unwrap());

    browser.close().await;
}

#[tokio::test]
#[ignore = "requires chromedriver"]
async fn click_times_out_on_missing_selector() {
    if !driver_available() {
        return;
    }

    let (mut browser, client, context) = open().await;
    goto(&client, &context, "<p>nothing here</p>").await;

    let opts = WaitOptions::with_timeout(std::time::Duration::from_millis(500));
    match actions::click(&client, &context, "#missing", opts).await {
        Err(Error::Timeout(err)) => {
            assert_eq!(err.selector, "#missing");
            assert!(err.to_string().contains("timeout after 500ms waiting for '#missing'"));
        }
        other => panic!("expected timeout, got {other:?}"),
    }

    browser.close().await;
}
