//! Skill lifecycle and timeout-bounded execution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    Sandbox, SandboxPolicy, Skill, SkillContext, SkillExecutor, SkillRegistry, SkillRequest,
    SkillResponse,
};
use crate::{Error, Result};

/// Options applied when a skill is loaded.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Free-form configuration stored on the managed record.
    pub config: Option<Value>,
    /// Per-skill timeout; the manager default applies when absent.
    pub timeout: Option<Duration>,
    /// Whether executions go through the sandbox.
    pub sandboxed: bool,
    /// Sandbox policy; derived from the timeout when absent.
    pub sandbox_policy: Option<SandboxPolicy>,
}

/// A loaded skill with its bound context and execution settings.
pub struct ManagedSkill {
    pub skill: Arc<Skill>,
    pub context: Arc<SkillContext>,
    pub loaded_at: DateTime<Utc>,
    pub config: Option<Value>,
    timeout: Duration,
    sandboxed: AtomicBool,
    sandbox: Sandbox,
}

impl ManagedSkill {
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn sandboxed(&self) -> bool {
        self.sandboxed.load(Ordering::Acquire)
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }
}

impl std::fmt::Debug for ManagedSkill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedSkill")
            .field("skill", &self.skill.name)
            .field("loaded_at", &self.loaded_at)
            .field("timeout", &self.timeout)
            .field("sandboxed", &self.sandboxed())
            .finish_non_exhaustive()
    }
}

/// Registers skills, binds their contexts and runs them under timeouts.
pub struct SkillManager {
    registry: Arc<SkillRegistry>,
    managed: RwLock<HashMap<String, Arc<ManagedSkill>>>,
    default_timeout: Duration,
    virtual_root: String,
}

impl SkillManager {
    pub fn new(registry: Arc<SkillRegistry>, default_timeout: Duration, virtual_root: &str) -> Self {
        Self {
            registry,
            managed: RwLock::new(HashMap::new()),
            default_timeout,
            virtual_root: virtual_root.to_owned(),
        }
    }

    pub fn registry(&self) -> &Arc<SkillRegistry> {
        &self.registry
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Register `skill`, bind `context`, initialize the executor and track
    /// the managed record. Exactly one managed record per skill name.
    pub async fn load(
        &self,
        skill: Skill,
        context: SkillContext,
        options: LoadOptions,
    ) -> Result<Arc<ManagedSkill>> {
        let name = skill.name.clone();
        {
            let managed = self.managed.read().expect("managed map poisoned");
            if managed.contains_key(&name) {
                return Err(Error::DuplicateName(format!("skill {name} already loaded")));
            }
        }

        let skill = self.registry.register(skill)?;
        let context = Arc::new(context);

        if let Some(executor) = &skill.executor {
            if let Err(err) = executor.init(&context).await {
                self.registry.unregister(&name).ok();
                return Err(err);
            }
        }

        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let policy = options.sandbox_policy.unwrap_or_else(|| SandboxPolicy {
            cpu_timeout: timeout,
            ..SandboxPolicy::default()
        });
        let record = Arc::new(ManagedSkill {
            skill,
            context,
            loaded_at: Utc::now(),
            config: options.config,
            timeout,
            sandboxed: AtomicBool::new(options.sandboxed),
            sandbox: Sandbox::new(policy, &self.virtual_root),
        });

        let mut managed = self.managed.write().expect("managed map poisoned");
        if managed.contains_key(&name) {
            self.registry.unregister(&name).ok();
            return Err(Error::DuplicateName(format!("skill {name} already loaded")));
        }
        managed.insert(name.clone(), Arc::clone(&record));
        debug!(skill = %name, timeout = ?record.timeout, "skill loaded");
        Ok(record)
    }

    /// Drop the managed record and unregister the skill.
    pub async fn unload(&self, name: &str) -> Result<()> {
        let removed = self.managed.write().expect("managed map poisoned").remove(name);
        if removed.is_none() {
            return Err(Error::SkillNotFound(name.to_owned()));
        }
        self.registry.unregister(name)?;
        debug!(skill = %name, "skill unloaded");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<ManagedSkill>> {
        self.managed
            .read()
            .expect("managed map poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| Error::SkillNotFound(name.to_owned()))
    }

    pub fn list(&self) -> Vec<Arc<ManagedSkill>> {
        self.managed.read().expect("managed map poisoned").values().cloned().collect()
    }

    /// Toggle sandboxing for a loaded skill.
    pub fn set_sandboxed(&self, name: &str, sandboxed: bool) -> Result<()> {
        let record = self.get(name)?;
        record.sandboxed.store(sandboxed, Ordering::Release);
        Ok(())
    }

    /// Execute one request against a loaded skill, honoring its timeout
    /// and sandbox setting.
    pub async fn execute(&self, name: &str, request: SkillRequest) -> Result<SkillResponse> {
        let record = self.get(name)?;
        let executor = record
            .skill
            .executor
            .clone()
            .ok_or_else(|| Error::Skill(format!("skill {name} has no executor")))?;

        if record.sandboxed() {
            let output = record
                .sandbox
                .execute(&executor, Arc::clone(&record.context), &record.skill, request)
                .await?;
            return Ok(output.response);
        }

        record.context.reset();
        run_executor(executor, Arc::clone(&record.context), record.timeout, request).await
    }
}

impl std::fmt::Debug for SkillManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillManager")
            .field("loaded", &self.managed.read().expect("managed map poisoned").len())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

/// Run `executor` on its own task, bounded by `timeout`.
///
/// The caller blocks on completion or expiry. On expiry the task keeps
/// running detached with the context's cancellation flag raised; whatever
/// it eventually produces is dropped.
pub(crate) async fn run_executor(
    executor: Arc<dyn SkillExecutor>,
    ctx: Arc<SkillContext>,
    timeout: Duration,
    request: SkillRequest,
) -> Result<SkillResponse> {
    let skill_name = ctx.skill_name.clone();
    let task_ctx = Arc::clone(&ctx);
    let handle = tokio::spawn(async move { executor.execute(task_ctx, request).await });

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(join_err)) => {
            if join_err.is_panic() {
                let payload = join_err.into_panic();
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "opaque panic payload".to_owned());
                warn!(skill = %skill_name, panic = %detail, "skill executor panicked");
                Err(Error::SkillPanic(format!("{skill_name}: {detail}")))
            } else {
                Err(Error::Skill(format!("{skill_name}: execution task aborted")))
            }
        }
        Err(_) => {
            ctx.set_cancelled(true);
            warn!(skill = %skill_name, ?timeout, "skill execution timed out");
            Err(Error::Timeout(timeout))
        }
    }
}
