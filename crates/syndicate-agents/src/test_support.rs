//! Mock inference providers for unit and cycle tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::inference::{InferenceProvider, InferenceReply, InferenceRequest, TokenUsage};

enum Behavior {
    Reply(String),
    Fail,
    Hang(Duration),
}

/// An inference provider with a scripted behavior and a call counter.
/// `replying` can be reconfigured between cycles via `set_reply`.
pub struct MockInference {
    behavior: Mutex<Behavior>,
    usage: TokenUsage,
    calls: AtomicUsize,
}

impl MockInference {
    /// Always returns the given content verbatim.
    pub fn replying(content: &str) -> Self {
        Self {
            behavior: Mutex::new(Behavior::Reply(content.to_string())),
            usage: TokenUsage {
                prompt_tokens: 500,
                completion_tokens: 100,
            },
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fails with a transport error.
    pub fn failing() -> Self {
        Self {
            behavior: Mutex::new(Behavior::Fail),
            usage: TokenUsage::default(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleeps past any reasonable timeout before replying.
    pub fn hanging(delay: Duration) -> Self {
        Self {
            behavior: Mutex::new(Behavior::Hang(delay)),
            usage: TokenUsage::default(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_usage(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.usage = TokenUsage {
            prompt_tokens,
            completion_tokens,
        };
        self
    }

    pub fn set_reply(&self, content: &str) {
        *self.behavior.lock().unwrap() = Behavior::Reply(content.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceProvider for MockInference {
    async fn complete(&self, _request: &InferenceRequest) -> Result<InferenceReply, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Snapshot the plan before awaiting so the mutex guard never crosses
        // an await point.
        let planned = {
            let behavior = self.behavior.lock().unwrap();
            match &*behavior {
                Behavior::Reply(content) => Behavior::Reply(content.clone()),
                Behavior::Fail => Behavior::Fail,
                Behavior::Hang(delay) => Behavior::Hang(*delay),
            }
        };
        match planned {
            Behavior::Reply(content) => Ok(InferenceReply {
                content,
                usage: self.usage.clone(),
            }),
            Behavior::Fail => Err(AgentError::Inference("mock transport failure".to_string())),
            Behavior::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Err(AgentError::Inference("mock hang elapsed".to_string()))
            }
        }
    }
}
