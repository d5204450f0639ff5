use std::sync::Arc;

use serde_json::json;

use crate::cdp::fake::FakeTransport;
use crate::cdp::{CdpError, ConnectionManager};
use crate::error::ActionError;
use crate::feedback::NoopFeedback;
use crate::snapshot::{SnapshotManager, SnapshotOptions};
use crate::wait::{WaitCoordinator, WaitConfig};

use super::*;

fn fast_wait_config() -> WaitConfig {
    WaitConfig {
        grace_ms: 100,
        nav_start_window_ms: 100,
        nav_complete_timeout_ms: 1_000,
        dom_stable_ms: 50,
        dom_stable_max_ms: 200,
        poll_ms: 20,
    }
}

fn ax_tree(role: &str, name: &str) -> serde_json::Value {
    json!({"nodes": [
        {
            "nodeId": "1",
            "role": {"type": "role", "value": "RootWebArea"},
            "name": {"type": "computedString", "value": "Page"},
            "childIds": ["2"],
            "frameId": "F0"
        },
        {
            "nodeId": "2",
            "role": {"type": "role", "value": role},
            "name": {"type": "computedString", "value": name},
            "parentId": "1",
            "backendDOMNodeId": 42
        }
    ]})
}

/// Script everything a successful physical click needs, with the element
/// described by `facts`.
fn script_page(transport: &FakeTransport, tree: serde_json::Value, facts: serde_json::Value) {
    transport.on_value("Accessibility.getFullAXTree", tree);
    transport.on_value("DOM.resolveNode", json!({"object": {"objectId": "obj-1"}}));
    transport.on_value(
        "DOM.getBoxModel",
        json!({"model": {
            "content": [10.0, 10.0, 110.0, 10.0, 110.0, 40.0, 10.0, 40.0],
            "padding": [], "border": [], "margin": [],
            "width": 100, "height": 30
        }}),
    );
    // DOM-stability probes.
    transport.on_value("Runtime.evaluate", json!({"result": {"value": true}}));

    transport.on("Runtime.callFunctionOn", move |params| {
        let params = params.unwrap();
        let declaration = params["functionDeclaration"].as_str().unwrap_or("");
        // Element scripts are told apart by distinctive fragments.
        let value = if declaration.contains("isContentEditable") {
            json!({"ok": true})
        } else if declaration.contains("dblclick") {
            json!({"ok": true})
        } else if declaration.contains("tagName") {
            facts.clone()
        } else {
            // Visibility / enabled predicates.
            json!(true)
        };
        Ok(json!({"result": {"value": value}}))
    });
}

async fn harness(transport: Arc<FakeTransport>) -> (Arc<ConnectionManager>, ActionExecutor, String) {
    let conn = ConnectionManager::new(transport).await.unwrap();
    conn.attach("T1").await.unwrap();
    let snapshots = SnapshotManager::new(conn.clone());
    let wait = Arc::new(WaitCoordinator::new(conn.clone(), fast_wait_config()));

    let doc = snapshots
        .take_snapshot(SnapshotOptions::default())
        .await
        .unwrap();
    let uid = doc
        .lines()
        .nth(1)
        .unwrap()
        .trim_start()
        .strip_prefix("uid=")
        .unwrap()
        .split(' ')
        .next()
        .unwrap()
        .to_string();

    let executor = ActionExecutor::new(
        conn.clone(),
        snapshots,
        wait,
        Arc::new(NoopFeedback),
        ExecutorConfig::default(),
    );
    (conn, executor, uid)
}

#[tokio::test(start_paused = true)]
async fn test_click_dispatches_trusted_events() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("button", "Save"),
        json!({"tagName": "button", "target": ""}),
    );
    let (_conn, executor, uid) = harness(transport.clone()).await;

    let message = executor.click(&uid, false).await.unwrap();
    assert!(message.contains("Clicked"));
    assert!(!message.contains("fallback"));

    // Move, press, release.
    let events = transport.calls_to("Input.dispatchMouseEvent");
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["type"], "mouseMoved");
    assert_eq!(events[1]["type"], "mousePressed");
    assert_eq!(events[2]["type"], "mouseReleased");
    // Centered on the content box.
    assert_eq!(events[1]["x"], 60.0);
    assert_eq!(events[1]["y"], 25.0);
}

#[tokio::test(start_paused = true)]
async fn test_click_falls_back_to_script_after_failed_attempts() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("button", "Save"),
        json!({"tagName": "button", "target": ""}),
    );
    // Trusted events never take.
    transport.on("Input.dispatchMouseEvent", |_| {
        Err(CdpError::Protocol {
            code: -32000,
            message: "Element is not interactable at this point".to_string(),
        })
    });
    let (_conn, executor, uid) = harness(transport.clone()).await;

    let message = executor.click(&uid, false).await.unwrap();
    assert!(message.contains("script fallback"));

    // Three physical attempts, each dying on its first dispatched event.
    assert_eq!(transport.call_count("Input.dispatchMouseEvent"), 3);
    // Then the synthetic click ran in-page.
    assert!(transport
        .calls_to("Runtime.callFunctionOn")
        .iter()
        .any(|p| p["functionDeclaration"]
            .as_str()
            .unwrap_or("")
            .contains("dblclick")));
}

#[tokio::test(start_paused = true)]
async fn test_click_blank_link_follows_popup() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("link", "Docs"),
        json!({"tagName": "a", "target": "_blank"}),
    );
    let (conn, executor, uid) = harness(transport.clone()).await;

    let t = transport.clone();
    let emitter = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        t.emit(
            "Target.targetCreated",
            json!({"targetInfo": {
                "targetId": "T-popup",
                "type": "page",
                "title": "Docs",
                "url": "https://example.com/docs"
            }}),
            None,
        );
    });

    let message = executor.click(&uid, false).await.unwrap();
    assert!(message.contains("switched to new tab"));
    assert_eq!(conn.attached_target().as_deref(), Some("T-popup"));

    // The original tab is one return away.
    let back = conn.return_to_previous().await.unwrap();
    assert_eq!(back.as_deref(), Some("T1"));
    emitter.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_click_blank_link_popup_timeout_stays_put() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("link", "Docs"),
        json!({"tagName": "a", "target": "_blank"}),
    );
    let (conn, executor, uid) = harness(transport.clone()).await;

    // No popup ever appears.
    let message = executor.click(&uid, false).await.unwrap();
    assert!(message.contains("Clicked"));
    assert!(!message.contains("new tab"));
    assert_eq!(conn.attached_target().as_deref(), Some("T1"));

    // The waiter slot was released.
    assert!(conn.arm_new_tab_wait().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_click_unknown_uid_is_immediate() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("button", "Save"),
        json!({"tagName": "button", "target": ""}),
    );
    let (_conn, executor, _uid) = harness(transport.clone()).await;

    let err = executor.click("u999", false).await.unwrap_err();
    assert!(matches!(err, ActionError::UnknownUid { .. }));
    assert_eq!(transport.call_count("Input.dispatchMouseEvent"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_click_stale_uid_carries_fresh_snapshot() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("button", "Save"),
        json!({"tagName": "button", "target": ""}),
    );
    // Known uid, but the node is gone from the DOM.
    transport.on("DOM.resolveNode", |_| {
        Err(CdpError::Protocol {
            code: -32000,
            message: "No node with given id found".to_string(),
        })
    });
    let (_conn, executor, uid) = harness(transport.clone()).await;

    let err = executor.click(&uid, false).await.unwrap_err();
    match err {
        ActionError::StaleUid { snapshot, .. } => {
            assert!(snapshot.contains("button \"Save\""));
        }
        other => panic!("expected StaleUid, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_click_option_goes_through_script() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("option", "Blue"),
        json!({"tagName": "option", "target": ""}),
    );
    let (_conn, executor, uid) = harness(transport.clone()).await;

    let message = executor.click(&uid, false).await.unwrap();
    assert!(message.contains("script fallback"));
    assert_eq!(transport.call_count("Input.dispatchMouseEvent"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_click_disabled_option_reports_script_error() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("option", "Blue"),
        json!({"tagName": "option", "target": ""}),
    );
    transport.on("Runtime.callFunctionOn", |params| {
        let params = params.unwrap();
        let declaration = params["functionDeclaration"].as_str().unwrap_or("");
        let value = if declaration.contains("dblclick") {
            json!({"ok": false, "error": "option \"Blue\" is disabled"})
        } else if declaration.contains("tagName") {
            json!({"tagName": "option", "target": ""})
        } else {
            json!(true)
        };
        Ok(json!({"result": {"value": value}}))
    });
    let (_conn, executor, uid) = harness(transport.clone()).await;

    let err = executor.click(&uid, false).await.unwrap_err();
    assert!(err.to_string().contains("disabled"));
    assert_eq!(transport.call_count("Input.dispatchMouseEvent"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_double_click_presses_twice() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("button", "Save"),
        json!({"tagName": "button", "target": ""}),
    );
    let (_conn, executor, uid) = harness(transport.clone()).await;

    let message = executor.click(&uid, true).await.unwrap();
    assert!(message.contains("Double-clicked"));

    let events = transport.calls_to("Input.dispatchMouseEvent");
    // Move + two press/release pairs.
    assert_eq!(events.len(), 5);
    assert_eq!(events[3]["clickCount"], 2);
}

#[tokio::test(start_paused = true)]
async fn test_fill_passes_value_to_page_script() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("textbox", "Email"),
        json!({"tagName": "input", "target": ""}),
    );
    let (_conn, executor, uid) = harness(transport.clone()).await;

    let message = executor.fill(&uid, "user@example.com").await.unwrap();
    assert!(message.contains("Filled"));

    let fill_call = transport
        .calls_to("Runtime.callFunctionOn")
        .into_iter()
        .find(|p| p["functionDeclaration"]
            .as_str()
            .unwrap_or("")
            .contains("isContentEditable"))
        .expect("fill script should run");
    assert_eq!(fill_call["arguments"][0]["value"], "user@example.com");
}

#[tokio::test(start_paused = true)]
async fn test_fill_surfaces_page_reported_failure() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("combobox", "Color"),
        json!({"tagName": "select", "target": ""}),
    );
    transport.on("Runtime.callFunctionOn", |params| {
        let params = params.unwrap();
        let declaration = params["functionDeclaration"].as_str().unwrap_or("");
        if declaration.contains("isContentEditable") {
            Ok(json!({"result": {"value": {"ok": false, "error": "no option matches \"Mauve\""}}}))
        } else {
            Ok(json!({"result": {"value": true}}))
        }
    });
    let (_conn, executor, uid) = harness(transport.clone()).await;

    let err = executor.fill(&uid, "Mauve").await.unwrap_err();
    assert!(err.to_string().contains("no option matches"));
}

#[tokio::test(start_paused = true)]
async fn test_press_named_key() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("textbox", "Email"),
        json!({"tagName": "input", "target": ""}),
    );
    let (_conn, executor, _uid) = harness(transport.clone()).await;

    executor.press_key("Enter").await.unwrap();

    let events = transport.calls_to("Input.dispatchKeyEvent");
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["type"], "rawKeyDown");
    assert_eq!(events[0]["windowsVirtualKeyCode"], 13);
    assert_eq!(events[1]["type"], "char");
    assert_eq!(events[1]["text"], "\r");
    assert_eq!(events[2]["type"], "keyUp");
}

#[tokio::test(start_paused = true)]
async fn test_press_single_char_inserts_text() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("textbox", "Email"),
        json!({"tagName": "input", "target": ""}),
    );
    let (_conn, executor, _uid) = harness(transport.clone()).await;

    executor.press_key("a").await.unwrap();
    assert_eq!(transport.call_count("Input.insertText"), 1);
    assert_eq!(transport.call_count("Input.dispatchKeyEvent"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_press_unknown_key_refused() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("textbox", "Email"),
        json!({"tagName": "input", "target": ""}),
    );
    let (_conn, executor, _uid) = harness(transport.clone()).await;

    let err = executor.press_key("MegaKey").await.unwrap_err();
    assert!(matches!(err, ActionError::UnsupportedKey(_)));
}

#[tokio::test(start_paused = true)]
async fn test_drag_interpolates_moves() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("listitem", "Card"),
        json!({"tagName": "div", "target": ""}),
    );
    let (_conn, executor, uid) = harness(transport.clone()).await;

    executor.drag(&uid, &uid).await.unwrap();

    let events = transport.calls_to("Input.dispatchMouseEvent");
    let moves = events.iter().filter(|e| e["type"] == "mouseMoved").count();
    let presses = events.iter().filter(|e| e["type"] == "mousePressed").count();
    let releases = events
        .iter()
        .filter(|e| e["type"] == "mouseReleased")
        .count();
    // Initial move plus the interpolated steps.
    assert_eq!(moves, 1 + ExecutorConfig::default().drag_steps as usize);
    assert_eq!(presses, 1);
    assert_eq!(releases, 1);
}

#[tokio::test(start_paused = true)]
async fn test_navigate_reports_browser_error() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("button", "Save"),
        json!({"tagName": "button", "target": ""}),
    );
    transport.on_value(
        "Page.navigate",
        json!({"errorText": "net::ERR_NAME_NOT_RESOLVED"}),
    );
    let (_conn, executor, _uid) = harness(transport.clone()).await;

    let err = executor
        .navigate("https://doesnotexist.invalid/")
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::NavigationFailed(_)));
    assert!(err.to_string().contains("ERR_NAME_NOT_RESOLVED"));
}

#[tokio::test(start_paused = true)]
async fn test_navigate_rejects_malformed_url() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("button", "Save"),
        json!({"tagName": "button", "target": ""}),
    );
    let (_conn, executor, _uid) = harness(transport.clone()).await;

    let err = executor.navigate("not a url").await.unwrap_err();
    assert!(matches!(err, ActionError::NavigationFailed(_)));
    assert_eq!(transport.call_count("Page.navigate"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_go_back_at_history_start() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("button", "Save"),
        json!({"tagName": "button", "target": ""}),
    );
    transport.on_value(
        "Page.getNavigationHistory",
        json!({"currentIndex": 0, "entries": [{"id": 1, "url": "https://example.com"}]}),
    );
    let (_conn, executor, _uid) = harness(transport.clone()).await;

    let err = executor.go_back().await.unwrap_err();
    assert!(err.to_string().contains("oldest"));
}

#[tokio::test(start_paused = true)]
async fn test_screenshot_decodes_payload() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("button", "Save"),
        json!({"tagName": "button", "target": ""}),
    );
    transport.on_value("Page.captureScreenshot", json!({"data": "aGVsbG8="}));
    let (_conn, executor, _uid) = harness(transport.clone()).await;

    let bytes = executor.screenshot().await.unwrap();
    assert_eq!(bytes, b"hello");
}

#[tokio::test(start_paused = true)]
async fn test_list_tabs_marks_attached() {
    let transport = FakeTransport::new();
    script_page(
        &transport,
        ax_tree("button", "Save"),
        json!({"tagName": "button", "target": ""}),
    );
    let (_conn, executor, _uid) = harness(transport.clone()).await;

    let listing = executor.list_tabs().await.unwrap();
    assert!(listing.contains("* [T1]"));
}
