//! Scriptable test doubles for the capabilities the pipeline consumes.
//!
//! Compiled for this crate's own tests and, behind the `testing` feature,
//! for downstream crates (the server's route tests use them).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::completion::{CompletionRequest, TextCompletion};
use crate::emergency_numbers::EmergencyLookup;
use crate::error::PipelineError;
use crate::types::{EmergencyContact, EmergencyInfo, Stage};

/// What a scripted stage does when called.
#[derive(Debug, Clone)]
pub enum Script {
    Reply(String),
    /// Reply after sleeping on the tokio clock.
    Delayed(Duration, String),
    Fail,
    /// Never completes.
    Hang,
}

/// A [`TextCompletion`] whose behaviour is scripted per [`Stage`].
///
/// Scripts queue per stage; the last one repeats once the queue is drained.
/// Unscripted stages fail.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    scripts: Mutex<HashMap<Stage, VecDeque<Script>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, stage: Stage, script: Script) -> Self {
        lock(&self.scripts).entry(stage).or_default().push_back(script);
        self
    }

    pub fn reply(self, stage: Stage, text: impl Into<String>) -> Self {
        self.script(stage, Script::Reply(text.into()))
    }

    pub fn fail(self, stage: Stage) -> Self {
        self.script(stage, Script::Fail)
    }

    pub fn hang(self, stage: Stage) -> Self {
        self.script(stage, Script::Hang)
    }

    /// Number of calls made for `stage`.
    pub fn calls(&self, stage: Stage) -> usize {
        lock(&self.requests).iter().filter(|r| r.stage == stage).count()
    }

    /// Requests received for `stage`, oldest first.
    pub fn requests(&self, stage: Stage) -> Vec<CompletionRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.stage == stage)
            .cloned()
            .collect()
    }

    fn next_script(&self, stage: Stage) -> Option<Script> {
        let mut scripts = lock(&self.scripts);
        let queue = scripts.get_mut(&stage)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl TextCompletion for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, PipelineError> {
        let stage = request.stage;
        lock(&self.requests).push(request);

        let failure = || PipelineError::Completion {
            provider: "scripted".to_owned(),
            message: format!("scripted failure for {stage}"),
        };

        match self.next_script(stage) {
            Some(Script::Reply(text)) => Ok(text),
            Some(Script::Delayed(after, text)) => {
                tokio::time::sleep(after).await;
                Ok(text)
            }
            Some(Script::Hang) => std::future::pending().await,
            Some(Script::Fail) | None => Err(failure()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupMode {
    Succeed,
    Fail,
    Hang,
}

/// An [`EmergencyLookup`] that counts its invocations.
#[derive(Debug)]
pub struct CountingLookup {
    mode: LookupMode,
    calls: AtomicUsize,
}

impl CountingLookup {
    /// Succeeds with `police: 999` for any location.
    pub fn new() -> Self {
        Self::with_mode(LookupMode::Succeed)
    }

    pub fn failing() -> Self {
        Self::with_mode(LookupMode::Fail)
    }

    pub fn hanging() -> Self {
        Self::with_mode(LookupMode::Hang)
    }

    fn with_mode(mode: LookupMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for CountingLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmergencyLookup for CountingLookup {
    async fn lookup(&self, location: &str) -> Result<EmergencyInfo, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Let concurrent callers pile up on the cache slot.
        tokio::task::yield_now().await;

        match self.mode {
            LookupMode::Succeed => Ok(EmergencyInfo {
                location: location.to_owned(),
                contacts: vec![
                    EmergencyContact::new("police", "999"),
                    EmergencyContact::new("crisis line", "116123"),
                ],
                verified: true,
                source: "counting".to_owned(),
                cached_at: Utc::now(),
            }),
            LookupMode::Fail => Err(PipelineError::Lookup {
                message: format!("no numbers for '{location}'"),
            }),
            LookupMode::Hang => std::future::pending().await,
        }
    }
}
