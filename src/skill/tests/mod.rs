#![cfg(test)]

mod sandbox;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Skill, SkillContext, SkillExecutor, SkillRequest, SkillResponse};

/// Executor scripted by a closure-free table of canned behaviors.
pub(crate) struct ScriptedExecutor {
    pub delay: Option<Duration>,
    pub panic_message: Option<&'static str>,
    pub response: SkillResponse,
}

impl ScriptedExecutor {
    pub fn replying(result: Value) -> Self {
        Self { delay: None, panic_message: None, response: SkillResponse::ok(result) }
    }

    pub fn failing(message: &str) -> Self {
        Self { delay: None, panic_message: None, response: SkillResponse::error(message) }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            panic_message: None,
            response: SkillResponse::ok(json!("late")),
        }
    }

    pub fn panicking(message: &'static str) -> Self {
        Self {
            delay: None,
            panic_message: Some(message),
            response: SkillResponse::ok(Value::Null),
        }
    }
}

#[async_trait]
impl SkillExecutor for ScriptedExecutor {
    async fn execute(&self, _ctx: Arc<SkillContext>, _request: SkillRequest) -> SkillResponse {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.panic_message {
            panic!("{message}");
        }
        self.response.clone()
    }
}

pub(crate) fn code_skill(name: &str, executor: ScriptedExecutor) -> Skill {
    Skill::code(name, "1.0.0", Arc::new(executor))
}
