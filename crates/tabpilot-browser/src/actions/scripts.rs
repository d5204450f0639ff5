//! In-page scripts used by the action executor.
//!
//! All scripts run via `Runtime.callFunctionOn` with `this` bound to the
//! target element, and return plain values (`returnByValue`).

/// Set a form control's value the way a user would, firing the events
/// frameworks listen for. Handles native inputs, selects (matching by
/// value, then visible text, then direct assignment), and contenteditable
/// hosts.
pub const FILL_ELEMENT: &str = r#"
function(value) {
    const el = this;
    const tag = el.tagName ? el.tagName.toLowerCase() : '';

    const fire = (type) => el.dispatchEvent(new Event(type, { bubbles: true }));

    if (tag === 'select') {
        let matched = -1;
        for (let i = 0; i < el.options.length; i++) {
            if (el.options[i].value === value) { matched = i; break; }
        }
        if (matched < 0) {
            for (let i = 0; i < el.options.length; i++) {
                if (el.options[i].text.trim() === value.trim()) { matched = i; break; }
            }
        }
        if (matched >= 0) {
            if (el.options[matched].disabled) {
                return { ok: false, error: 'option "' + value + '" is disabled' };
            }
            el.selectedIndex = matched;
        } else {
            el.value = value;
            if (el.value !== value) {
                return { ok: false, error: 'no option matches "' + value + '"' };
            }
        }
        fire('input');
        fire('change');
        fire('click');
        return { ok: true };
    }

    if (tag === 'input' || tag === 'textarea') {
        // Use the prototype setter so framework value trackers notice.
        const proto = tag === 'input'
            ? window.HTMLInputElement.prototype
            : window.HTMLTextAreaElement.prototype;
        const desc = Object.getOwnPropertyDescriptor(proto, 'value');
        el.focus();
        if (desc && desc.set) {
            desc.set.call(el, value);
        } else {
            el.value = value;
        }
        fire('input');
        fire('change');
        return { ok: true };
    }

    if (el.isContentEditable) {
        el.focus();
        document.execCommand('selectAll', false, null);
        document.execCommand('insertText', false, value);
        if (el.textContent !== value) {
            // Editors that intercept execCommand leave the old content.
            el.textContent = value;
            fire('input');
        }
        return { ok: true };
    }

    return { ok: false, error: 'element is not fillable (' + tag + ')' };
}
"#;

/// Synthetic click used when trusted input events fail. Dispatches a
/// composed pointer/mouse sequence; falls back to element semantics for
/// options and checkboxes that ignore synthetic events.
pub const FALLBACK_CLICK: &str = r#"
function(double) {
    const el = this;
    const tag = el.tagName ? el.tagName.toLowerCase() : '';

    if (tag === 'option') {
        const select = el.closest('select');
        if (select) {
            if (el.disabled || select.disabled) {
                return { ok: false, error: 'option "' + (el.text || '').trim() + '" is disabled' };
            }
            select.selectedIndex = el.index;
            select.dispatchEvent(new Event('input', { bubbles: true }));
            select.dispatchEvent(new Event('change', { bubbles: true }));
            return { ok: true };
        }
    }

    const rect = el.getBoundingClientRect();
    const x = rect.left + rect.width / 2;
    const y = rect.top + rect.height / 2;
    const opts = { bubbles: true, cancelable: true, composed: true, clientX: x, clientY: y };

    el.dispatchEvent(new PointerEvent('pointerdown', opts));
    el.dispatchEvent(new MouseEvent('mousedown', opts));
    el.dispatchEvent(new PointerEvent('pointerup', opts));
    el.dispatchEvent(new MouseEvent('mouseup', opts));
    el.dispatchEvent(new MouseEvent('click', { ...opts, detail: 1 }));
    if (double) {
        el.dispatchEvent(new MouseEvent('dblclick', { ...opts, detail: 2 }));
    }

    if ((tag === 'input' && (el.type === 'checkbox' || el.type === 'radio'))) {
        // Some handlers preventDefault the synthetic click; force the state.
        if (el.type === 'checkbox') el.checked = !el.checked;
        else el.checked = true;
        el.dispatchEvent(new Event('change', { bubbles: true }));
    }
    return { ok: true };
}
"#;

/// Element facts the executor needs before interacting.
pub const DESCRIBE_ELEMENT: &str = r#"
function() {
    const el = this;
    return {
        tagName: el.tagName ? el.tagName.toLowerCase() : '',
        type: el.type || '',
        href: el.href || '',
        target: el.getAttribute ? (el.getAttribute('target') || '') : '',
    };
}
"#;

/// Visibility predicate for preflight polling.
pub const VISIBLE_CONDITION: &str = "(() => { \
    const r = el.getBoundingClientRect(); \
    const s = window.getComputedStyle(el); \
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; \
})()";

/// Enabled predicate for preflight polling.
pub const ENABLED_CONDITION: &str =
    "!el.disabled && el.getAttribute('aria-disabled') !== 'true'";
