//! Clipboard capture via arboard.

use arboard::Clipboard;
use tracing::{debug, warn};

/// Read the clipboard, returning trimmed non-empty text only.
///
/// Empty or non-text clipboard contents return None; capture never
/// fails the calling event loop.
pub fn read_text() -> Option<String> {
    let mut clipboard = match Clipboard::new() {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to open clipboard: {}", e);
            return None;
        }
    };

    match clipboard.get_text() {
        Ok(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                debug!("Clipboard is empty or whitespace only");
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(e) => {
            debug!("No text on clipboard: {}", e);
            None
        }
    }
}
