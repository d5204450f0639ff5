//! Keyboard input: filling controls and pressing keys.

use serde_json::json;
use tracing::debug;

use crate::error::ActionError;

use super::scripts;
use super::ActionExecutor;

/// Named keys: (key, windowsVirtualKeyCode, text sent with the char event).
const KEY_TABLE: &[(&str, &str, u32, &str)] = &[
    ("Enter", "Enter", 13, "\r"),
    ("Backspace", "Backspace", 8, ""),
    ("Tab", "Tab", 9, "\t"),
    ("Escape", "Escape", 27, ""),
    ("Delete", "Delete", 46, ""),
    ("ArrowLeft", "ArrowLeft", 37, ""),
    ("ArrowRight", "ArrowRight", 39, ""),
    ("ArrowUp", "ArrowUp", 38, ""),
    ("ArrowDown", "ArrowDown", 40, ""),
    ("PageUp", "PageUp", 33, ""),
    ("PageDown", "PageDown", 34, ""),
    ("Home", "Home", 36, ""),
    ("End", "End", 35, ""),
    ("Space", " ", 32, " "),
];

impl ActionExecutor {
    /// Set a form control's value.
    ///
    /// Runs in-page so frameworks see the same event sequence a typing
    /// user produces. Selects match by option value first, then by
    /// visible text.
    pub async fn fill(&self, uid: &str, value: &str) -> Result<String, ActionError> {
        let element = self.resolve(uid).await?;
        self.preflight(&element).await?;

        let target = &element;
        let result = self
            .wait
            .settle(|| {
                self.call_element_function(target, scripts::FILL_ELEMENT, vec![json!(value)])
            })
            .await?;

        if result["ok"].as_bool() != Some(true) {
            let reason = result["error"].as_str().unwrap_or("fill failed");
            return Err(ActionError::Failed(format!("Cannot fill {}: {}", uid, reason)));
        }
        Ok(format!("Filled {}", uid))
    }

    /// Press a key on the focused element.
    ///
    /// Accepts the named keys in the key table or any single printable
    /// character. Anything else is refused rather than guessed at.
    pub async fn press_key(&self, key: &str) -> Result<String, ActionError> {
        if let Some((_, dom_key, code, text)) =
            KEY_TABLE.iter().find(|(name, _, _, _)| *name == key)
        {
            debug!("Pressing key {}", key);
            self.wait
                .settle(|| self.dispatch_named_key(dom_key, *code, text))
                .await?;
            return Ok(format!("Pressed {}", key));
        }

        let mut chars = key.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_control() => {
                self.wait
                    .settle(|| async move {
                        self.conn
                            .call(
                                "Input.insertText",
                                Some(json!({"text": c.to_string()})),
                            )
                            .await?;
                        Ok::<_, ActionError>(())
                    })
                    .await?;
                Ok(format!("Typed {}", c))
            }
            _ => Err(ActionError::UnsupportedKey(key.to_string())),
        }
    }

    async fn dispatch_named_key(
        &self,
        dom_key: &str,
        code: u32,
        text: &str,
    ) -> Result<(), ActionError> {
        self.conn
            .call(
                "Input.dispatchKeyEvent",
                Some(json!({
                    "type": "rawKeyDown",
                    "key": dom_key,
                    "windowsVirtualKeyCode": code,
                    "nativeVirtualKeyCode": code,
                })),
            )
            .await?;
        if !text.is_empty() {
            self.conn
                .call(
                    "Input.dispatchKeyEvent",
                    Some(json!({"type": "char", "text": text})),
                )
                .await?;
        }
        self.conn
            .call(
                "Input.dispatchKeyEvent",
                Some(json!({
                    "type": "keyUp",
                    "key": dom_key,
                    "windowsVirtualKeyCode": code,
                    "nativeVirtualKeyCode": code,
                })),
            )
            .await?;
        Ok(())
    }
}
