//! Collaborators the board cannot drive itself: the frame streamer and the
//! speech synthesizer. Both are external programs.

use std::process::{Child, Command, Stdio};

use anyhow::{anyhow, Context};
use log::{info, warn};

use crate::config::HostConfig;

pub trait Effects {
    /// Start the streamer if it is not already running.
    fn start_stream(&mut self) -> anyhow::Result<()>;
    fn stop_stream(&mut self);
    /// Say phrase `n` (1 to 9) without waiting for it to finish.
    fn speak(&mut self, n: u8) -> anyhow::Result<()>;
}

pub struct ProcessEffects {
    stream_command: Vec<String>,
    speech_command: Vec<String>,
    phrases: Vec<String>,
    streamer: Option<Child>,
    speech: Option<Child>,
}

impl ProcessEffects {
    pub fn new(cfg: &HostConfig) -> Self {
        Self {
            stream_command: cfg.stream_command.clone(),
            speech_command: cfg.speech_command.clone(),
            phrases: cfg.phrases.clone(),
            streamer: None,
            speech: None,
        }
    }

    fn streaming(&mut self) -> bool {
        match self.streamer.as_mut().map(|c| c.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                warn!("streamer exited: {}", status);
                self.streamer = None;
                false
            }
            Some(Err(e)) => {
                warn!("streamer state unknown: {}", e);
                false
            }
            None => false,
        }
    }
}

fn spawn(argv: &[String], extra: Option<&str>) -> anyhow::Result<Child> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command line"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null()).stdout(Stdio::null());
    if let Some(extra) = extra {
        cmd.arg(extra);
    }
    cmd.spawn().with_context(|| format!("starting {}", program))
}

impl Effects for ProcessEffects {
    fn start_stream(&mut self) -> anyhow::Result<()> {
        if self.streaming() {
            return Ok(());
        }
        info!("starting frame stream");
        self.streamer = Some(spawn(&self.stream_command, None)?);
        Ok(())
    }

    fn stop_stream(&mut self) {
        if let Some(mut child) = self.streamer.take() {
            info!("stopping frame stream");
            if let Err(e) = child.kill() {
                warn!("could not stop streamer: {}", e);
            }
            let _ = child.wait();
        }
    }

    fn speak(&mut self, n: u8) -> anyhow::Result<()> {
        let phrase = (n as usize)
            .checked_sub(1)
            .and_then(|i| self.phrases.get(i))
            .ok_or_else(|| anyhow!("no phrase {}", n))?;
        // one phrase at a time
        if let Some(mut prev) = self.speech.take() {
            if matches!(prev.try_wait(), Ok(None)) {
                self.speech = Some(prev);
                warn!("still speaking, dropping phrase {}", n);
                return Ok(());
            }
        }
        info!("saying {:?}", phrase);
        self.speech = Some(spawn(&self.speech_command, Some(phrase))?);
        Ok(())
    }
}

impl Drop for ProcessEffects {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::Effects;

    #[derive(Debug, Default)]
    pub struct RecordingEffects {
        pub streaming: bool,
        pub spoken: Vec<u8>,
        pub stream_starts: usize,
    }

    impl Effects for RecordingEffects {
        fn start_stream(&mut self) -> anyhow::Result<()> {
            if !self.streaming {
                self.stream_starts += 1;
            }
            self.streaming = true;
            Ok(())
        }

        fn stop_stream(&mut self) {
            self.streaming = false;
        }

        fn speak(&mut self, n: u8) -> anyhow::Result<()> {
            self.spoken.push(n);
            Ok(())
        }
    }
}
