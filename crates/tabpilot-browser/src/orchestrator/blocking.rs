//! Detection of page states automation must not push through.

use serde_json::json;
use tracing::debug;

use crate::cdp::ConnectionManager;

/// Scans the page for states that need a human: captchas, credential
/// prompts, one-time codes, and modal dialogs. Returns a reason string.
const BLOCKING_SCAN_JS: &str = r#"
(() => {
    const visible = (el) => {
        const r = el.getBoundingClientRect();
        return r.width > 0 && r.height > 0;
    };

    const captchaFrames = document.querySelectorAll(
        'iframe[src*="recaptcha"], iframe[src*="hcaptcha"], iframe[src*="turnstile"]');
    for (const frame of captchaFrames) {
        if (visible(frame)) return { blocked: true, reason: 'captcha challenge' };
    }
    const captchaWidgets = document.querySelectorAll('.g-recaptcha, .h-captcha, .cf-turnstile');
    for (const w of captchaWidgets) {
        if (visible(w)) return { blocked: true, reason: 'captcha challenge' };
    }

    const passwords = document.querySelectorAll('input[type="password"]');
    for (const p of passwords) {
        if (visible(p)) return { blocked: true, reason: 'password entry' };
    }

    const otps = document.querySelectorAll(
        'input[autocomplete="one-time-code"], input[name*="otp" i], input[id*="otp" i]');
    for (const o of otps) {
        if (visible(o)) return { blocked: true, reason: 'one-time code entry' };
    }

    const dialogs = document.querySelectorAll('[role="dialog"][aria-modal="true"], dialog[open]');
    for (const d of dialogs) {
        if (visible(d) && d.querySelector('input[type="password"], .g-recaptcha')) {
            return { blocked: true, reason: 'modal requiring credentials' };
        }
    }

    return { blocked: false };
})()
"#;

/// Check the attached page for a blocking state.
///
/// Scan failures (detached page, mid-navigation context) count as not
/// blocked; the action itself will surface anything real.
pub async fn scan_for_blockers(conn: &ConnectionManager) -> Option<String> {
    let result = conn
        .call(
            "Runtime.evaluate",
            Some(json!({"expression": BLOCKING_SCAN_JS, "returnByValue": true})),
        )
        .await
        .ok()?;

    let value = &result["result"]["value"];
    if value["blocked"].as_bool() == Some(true) {
        let reason = value["reason"].as_str().unwrap_or("blocking page state");
        debug!("Blocking state detected: {}", reason);
        return Some(reason.to_string());
    }
    None
}
