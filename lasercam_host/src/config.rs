use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Phrases for `S1`..`S9`.
pub const DEFAULT_PHRASES: [&str; 9] = [
    "hey cat!",
    "meow meow meow",
    "kitty! kitty! kitty!",
    "shall we play a game?",
    "sound 5",
    "sound 6",
    "sound 7",
    "sound 8",
    "sound 9",
];

/// Host bridge settings. Every field has a default, so a config file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Address the remote-control socket listens on.
    pub listen: String,
    /// Serial device; found by USB id when unset.
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Per-read timeout on the serial link.
    pub timeout_ms: u64,
    /// How often a NACKed packet is sent again.
    pub retries: u8,
    /// Port the frame streamer serves on; sent back to clients on `CN`.
    pub stream_port: u16,
    /// Program and arguments that run the frame streamer.
    pub stream_command: Vec<String>,
    /// Program and leading arguments for speech; the phrase is appended.
    pub speech_command: Vec<String>,
    pub phrases: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            port: None,
            baud_rate: 9600,
            timeout_ms: 1000,
            retries: 3,
            stream_port: 8081,
            stream_command: [
                "mjpg_streamer",
                "-i",
                "input_uvc.so -r 640x480 -f 10",
                "-o",
                "output_http.so -p 8081",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            speech_command: vec!["espeak".to_string()],
            phrases: DEFAULT_PHRASES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl HostConfig {
    /// Defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Text for phrase `n`, counted from 1.
    pub fn phrase(&self, n: u8) -> Option<&str> {
        let index = (n as usize).checked_sub(1)?;
        self.phrases.get(index).map(String::as_str)
    }
}
