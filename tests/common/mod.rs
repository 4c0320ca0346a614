//! Shared helpers for integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use strongbox::{ClientConfig, Credentials, PromptProvider, Result, StrongboxError};

pub fn test_credentials() -> Credentials {
    Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY", None)
}

/// Config wired to a mock backend with an explicit-credentials strategy.
pub fn signed_config(backend_uri: &str) -> ClientConfig {
    ClientConfig::new(backend_uri)
        .with_credentials(test_credentials())
        .with_region("us-east-1")
}

/// Prompt provider that replays scripted answers in order.
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
    pub prompts_seen: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            prompts_seen: Mutex::new(Vec::new()),
        }
    }

    fn next(&self, prompt: &str) -> Result<String> {
        self.prompts_seen.lock().unwrap().push(prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(StrongboxError::PromptCancelled)
    }
}

impl PromptProvider for ScriptedPrompt {
    fn read_line(&self, prompt: &str) -> Result<String> {
        self.next(prompt)
    }

    fn read_password(&self, prompt: &str) -> Result<String> {
        self.next(prompt)
    }
}

/// Prompt provider that blocks until an answer is fed through a channel.
pub struct GatedPrompt {
    answers: Mutex<std::sync::mpsc::Receiver<String>>,
}

impl GatedPrompt {
    pub fn new() -> (std::sync::mpsc::Sender<String>, Self) {
        let (tx, rx) = std::sync::mpsc::channel();
        (
            tx,
            Self {
                answers: Mutex::new(rx),
            },
        )
    }

    fn recv(&self) -> Result<String> {
        self.answers
            .lock()
            .unwrap()
            .recv()
            .map_err(|_| StrongboxError::PromptCancelled)
    }
}

impl PromptProvider for GatedPrompt {
    fn read_line(&self, _prompt: &str) -> Result<String> {
        self.recv()
    }

    fn read_password(&self, _prompt: &str) -> Result<String> {
        self.recv()
    }
}

/// Prompt provider that simulates an interrupt at the first prompt.
pub struct CancellingPrompt;

impl PromptProvider for CancellingPrompt {
    fn read_line(&self, _prompt: &str) -> Result<String> {
        Err(StrongboxError::PromptCancelled)
    }

    fn read_password(&self, _prompt: &str) -> Result<String> {
        Err(StrongboxError::PromptCancelled)
    }
}
