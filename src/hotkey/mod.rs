//! Global hotkey listener.
//!
//! Captures keyboard events system-wide using `rdev` and sends trigger
//! events via a channel to the main event loop. The default binding is
//! ctrl+alt+p; Escape quits.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use rdev::{listen, Event, EventType, Key};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Events emitted by the hotkey listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The speak combo was pressed: read the clipboard and synthesize.
    Speak,
    /// Escape was pressed: shut down.
    Quit,
}

/// Configuration for the hotkey binding.
#[derive(Debug, Clone)]
pub struct HotkeyConfig {
    /// Combo string, e.g. "ctrl+alt+p" or "ctrl+shift+space".
    pub speak_combo: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            speak_combo: "ctrl+alt+p".to_string(),
        }
    }
}

/// Modifier requirements plus the terminal key of a combo.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Combo {
    ctrl: bool,
    alt: bool,
    shift: bool,
    key: Key,
}

/// Parse a combo string like "ctrl+alt+p" into its parts.
fn parse_combo(spec: &str) -> Option<Combo> {
    let mut ctrl = false;
    let mut alt = false;
    let mut shift = false;
    let mut key = None;

    for part in spec.split('+') {
        let part = part.trim().to_lowercase();
        match part.as_str() {
            "ctrl" | "control" => ctrl = true,
            "alt" | "option" => alt = true,
            "shift" => shift = true,
            "cmd" | "meta" | "super" => {
                warn!("Meta modifier is not supported, ignoring it in {:?}", spec);
            }
            other => {
                if key.replace(parse_key(other)?).is_some() {
                    warn!("Combo {:?} names more than one non-modifier key", spec);
                    return None;
                }
            }
        }
    }

    key.map(|key| Combo {
        ctrl,
        alt,
        shift,
        key,
    })
}

/// Parse a single key name into an rdev key.
fn parse_key(name: &str) -> Option<Key> {
    let key = match name {
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        "space" => Key::Space,
        "tab" => Key::Tab,
        "home" => Key::Home,
        "end" => Key::End,
        "insert" => Key::Insert,
        "delete" => Key::Delete,
        "a" => Key::KeyA,
        "b" => Key::KeyB,
        "c" => Key::KeyC,
        "d" => Key::KeyD,
        "e" => Key::KeyE,
        "f" => Key::KeyF,
        "g" => Key::KeyG,
        "h" => Key::KeyH,
        "i" => Key::KeyI,
        "j" => Key::KeyJ,
        "k" => Key::KeyK,
        "l" => Key::KeyL,
        "m" => Key::KeyM,
        "n" => Key::KeyN,
        "o" => Key::KeyO,
        "p" => Key::KeyP,
        "q" => Key::KeyQ,
        "r" => Key::KeyR,
        "s" => Key::KeyS,
        "t" => Key::KeyT,
        "u" => Key::KeyU,
        "v" => Key::KeyV,
        "w" => Key::KeyW,
        "x" => Key::KeyX,
        "y" => Key::KeyY,
        "z" => Key::KeyZ,
        "0" => Key::Num0,
        "1" => Key::Num1,
        "2" => Key::Num2,
        "3" => Key::Num3,
        "4" => Key::Num4,
        "5" => Key::Num5,
        "6" => Key::Num6,
        "7" => Key::Num7,
        "8" => Key::Num8,
        "9" => Key::Num9,
        _ => {
            warn!("Unknown hotkey: {}", name);
            return None;
        }
    };
    Some(key)
}

/// Global hotkey listener using rdev for system-wide key capture.
pub struct HotkeyListener {
    config: HotkeyConfig,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    pub fn new(config: HotkeyConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start listening for hotkeys in a background thread.
    /// Sends `HotkeyEvent`s to the provided channel.
    pub fn start(&self, tx: mpsc::Sender<HotkeyEvent>) {
        let Some(combo) = parse_combo(&self.config.speak_combo) else {
            warn!(combo = %self.config.speak_combo, "Unparseable hotkey combo, listener not started");
            return;
        };

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();

        info!(combo = %self.config.speak_combo, "Starting hotkey listener");

        // Modifier state tracked from press/release events; the combo
        // fires on the terminal key press while all required modifiers
        // are held.
        let ctrl_down = Arc::new(AtomicBool::new(false));
        let alt_down = Arc::new(AtomicBool::new(false));
        let shift_down = Arc::new(AtomicBool::new(false));
        let last_fire = Arc::new(AtomicU64::new(0));

        // OS key repeat resends the terminal key while held; suppress
        // refires inside this window.
        const MIN_REPEAT_MS: u64 = 400;

        fn now_ms() -> u64 {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64
        }

        thread::spawn(move || {
            let callback = move |event: Event| {
                if !running.load(Ordering::SeqCst) {
                    return;
                }

                match event.event_type {
                    EventType::KeyPress(key) => match key {
                        Key::ControlLeft | Key::ControlRight => {
                            ctrl_down.store(true, Ordering::SeqCst);
                        }
                        Key::Alt | Key::AltGr => {
                            alt_down.store(true, Ordering::SeqCst);
                        }
                        Key::ShiftLeft | Key::ShiftRight => {
                            shift_down.store(true, Ordering::SeqCst);
                        }
                        Key::Escape => {
                            let _ = tx.blocking_send(HotkeyEvent::Quit);
                        }
                        pressed if pressed == combo.key => {
                            let modifiers_ok = (!combo.ctrl
                                || ctrl_down.load(Ordering::SeqCst))
                                && (!combo.alt || alt_down.load(Ordering::SeqCst))
                                && (!combo.shift || shift_down.load(Ordering::SeqCst));
                            if modifiers_ok {
                                let now = now_ms();
                                if now.saturating_sub(last_fire.load(Ordering::SeqCst))
                                    >= MIN_REPEAT_MS
                                {
                                    last_fire.store(now, Ordering::SeqCst);
                                    let _ = tx.blocking_send(HotkeyEvent::Speak);
                                }
                            }
                        }
                        _ => {}
                    },
                    EventType::KeyRelease(key) => match key {
                        Key::ControlLeft | Key::ControlRight => {
                            ctrl_down.store(false, Ordering::SeqCst);
                        }
                        Key::Alt | Key::AltGr => {
                            alt_down.store(false, Ordering::SeqCst);
                        }
                        Key::ShiftLeft | Key::ShiftRight => {
                            shift_down.store(false, Ordering::SeqCst);
                        }
                        _ => {}
                    },
                    _ => {}
                }
            };

            if let Err(e) = listen(callback) {
                warn!("Hotkey listener error: {:?}", e);
            }
        });
    }

    /// Stop the hotkey listener; the callback goes inert.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_combo() {
        let combo = parse_combo("ctrl+alt+p").unwrap();
        assert!(combo.ctrl);
        assert!(combo.alt);
        assert!(!combo.shift);
        assert_eq!(combo.key, Key::KeyP);
    }

    #[test]
    fn test_parse_combo_is_case_insensitive() {
        let combo = parse_combo("Ctrl+Shift+Space").unwrap();
        assert!(combo.ctrl);
        assert!(combo.shift);
        assert_eq!(combo.key, Key::Space);
    }

    #[test]
    fn test_parse_combo_rejects_garbage() {
        assert!(parse_combo("ctrl+alt").is_none());
        assert!(parse_combo("ctrl+banana").is_none());
        assert!(parse_combo("ctrl+a+b").is_none());
    }

    #[test]
    fn test_parse_bare_key_combo() {
        let combo = parse_combo("f5").unwrap();
        assert!(!combo.ctrl && !combo.alt && !combo.shift);
        assert_eq!(combo.key, Key::F5);
    }
}
