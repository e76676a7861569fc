//! Operating-system voice utility, the tier of last resort.
//!
//! Shells out to `say` on macOS, `espeak` on Linux, and the
//! System.Speech synthesizer via PowerShell on Windows. There is
//! nothing to load, so readiness never fails; problems only surface at
//! speak time.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use tokio::process::Command;
use tracing::info;

use super::{Capability, LoadMode, SynthesisBackend};

pub struct SystemVoice;

impl SystemVoice {
    pub fn new() -> Self {
        Self
    }

    async fn speak_to_file(text: &str, language: Option<&str>, out: &Path) -> anyhow::Result<()> {
        let output = if cfg!(target_os = "macos") {
            Command::new("say")
                .arg("-o")
                .arg(out)
                .arg("--data-format=LEF32@22050")
                .arg(text)
                .output()
                .await?
        } else if cfg!(target_os = "windows") {
            let script = format!(
                "Add-Type -AssemblyName System.Speech; \
                 $s = New-Object System.Speech.Synthesis.SpeechSynthesizer; \
                 $s.SetOutputToWaveFile('{}'); \
                 $s.Speak('{}'); \
                 $s.Dispose()",
                powershell_quote(&out.to_string_lossy()),
                powershell_quote(text)
            );
            Command::new("powershell")
                .args(["-NoProfile", "-Command", &script])
                .output()
                .await?
        } else {
            let mut cmd = Command::new("espeak");
            if let Some(lang) = language {
                if lang.starts_with("zh") {
                    cmd.args(["-v", "zh"]);
                }
            }
            cmd.arg("-w").arg(out).arg(text).output().await?
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("system voice exited with {}: {}", output.status, stderr.trim());
        }

        match std::fs::metadata(out) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => anyhow::bail!("system voice produced no audio file"),
        }
    }
}

/// Escape a string for single-quoted PowerShell literals.
fn powershell_quote(s: &str) -> String {
    s.replace('\'', "''")
}

impl SynthesisBackend for SystemVoice {
    fn id(&self) -> &str {
        "system-voice"
    }

    fn capabilities(&self) -> &[Capability] {
        // The OS voice takes any text; pronunciation quality is its
        // caller's problem.
        &[Capability::HandlesCjk]
    }

    fn initialize(&self, _mode: LoadMode) -> anyhow::Result<()> {
        Ok(())
    }

    fn synthesize<'a>(
        &'a self,
        text: &'a str,
        language: Option<&'a str>,
        out: &'a Path,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            info!(text_len = text.len(), "Speaking via OS voice utility");
            Self::speak_to_file(text, language, out).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_powershell_quote_doubles_single_quotes() {
        assert_eq!(powershell_quote("it's"), "it''s");
        assert_eq!(powershell_quote("plain"), "plain");
    }

    #[test]
    fn test_system_voice_is_always_ready() {
        let voice = SystemVoice::new();
        assert!(voice.initialize(LoadMode::Strict).is_ok());
        assert!(voice.capabilities().contains(&Capability::HandlesCjk));
    }
}
