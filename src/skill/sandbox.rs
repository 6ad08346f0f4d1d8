//! Per-invocation policy envelope around a skill executor.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use super::manager::run_executor;
use super::{Skill, SkillContext, SkillExecutor, SkillRequest, SkillResponse};
use crate::audit::{self, AuditOperation, AuditRecord, AuditSink};
use crate::{path, Error, Result};

/// Violation tags recorded by the sandbox.
pub const VIOLATION_CPU_TIMEOUT: &str = "cpu_timeout";
pub const VIOLATION_MEMORY_LIMIT: &str = "memory_limit_exceeded";
pub const VIOLATION_HOST_FS: &str = "blocked_host_fs_access";
pub const VIOLATION_SYSTEM_PATH: &str = "blocked_system_path";

/// System prefixes no sandboxed request may touch, checked against both
/// the original and the normalized request path.
const DENIED_PREFIXES: &[&str] = &[
    "/etc",
    "/sys",
    "/proc",
    "/dev",
    "/boot",
    "/root",
    "c:/windows",
    "c:/program files",
    "c:/program files (x86)",
];

/// Per-call resource and path policy.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    /// Upper bound on execution time.
    pub cpu_timeout: Duration,
    /// Advisory memory bound in bytes; executors report usage through the
    /// context.
    pub memory_limit: Option<u64>,
    /// When false, requests may only address paths under the virtual root.
    pub allow_host_fs: bool,
    pub capture_stdout: bool,
    pub capture_stderr: bool,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            cpu_timeout: Duration::from_secs(30),
            memory_limit: None,
            allow_host_fs: false,
            capture_stdout: true,
            capture_stderr: true,
        }
    }
}

/// One recorded policy violation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub kind: String,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl Violation {
    fn new(kind: &str, detail: String) -> Self {
        Self { kind: kind.to_owned(), detail, at: Utc::now() }
    }
}

/// Everything one sandboxed execution produced.
#[derive(Debug, Clone)]
pub struct SandboxOutput {
    pub response: SkillResponse,
    pub stdout: String,
    pub stderr: String,
    pub cpu_time: Duration,
    pub memory_used: u64,
    pub violations: Vec<Violation>,
    pub skill_name: String,
    pub skill_version: String,
}

impl SandboxOutput {
    pub fn success(&self) -> bool {
        self.response.success
    }

    pub fn error(&self) -> Option<&str> {
        self.response.error.as_deref()
    }
}

/// Wraps an executor with the per-invocation policy.
///
/// Executions serialize on the instance mutex so captured stdio streams
/// never interleave between calls.
pub struct Sandbox {
    policy: SandboxPolicy,
    virtual_root: String,
    gate: AsyncMutex<()>,
    history: Mutex<Vec<Violation>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl Sandbox {
    pub fn new(policy: SandboxPolicy, virtual_root: &str) -> Self {
        Self {
            policy,
            virtual_root: virtual_root.to_owned(),
            gate: AsyncMutex::new(()),
            history: Mutex::new(Vec::new()),
            audit: None,
        }
    }

    /// Attach a sink receiving one audit record per execution.
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// Every violation recorded over the sandbox's lifetime.
    pub fn violations(&self) -> Vec<Violation> {
        self.history.lock().expect("violation history poisoned").clone()
    }

    fn record_violation(&self, violation: &Violation) {
        self.history.lock().expect("violation history poisoned").push(violation.clone());
    }

    /// Execute `request` under the policy.
    ///
    /// A blocked path fails the call without running the executor; a CPU
    /// timeout surfaces as [`Error::Timeout`] after recording its
    /// violation. All other outcomes return the full output record.
    pub async fn execute(
        &self,
        executor: &Arc<dyn SkillExecutor>,
        ctx: Arc<SkillContext>,
        skill: &Skill,
        request: SkillRequest,
    ) -> Result<SandboxOutput> {
        let _serialized = self.gate.lock().await;
        let started = Instant::now();
        ctx.reset();

        let mut violations = Vec::new();

        if !self.policy.allow_host_fs {
            if let Some(violation) = self.check_request_path(&request) {
                self.record_violation(&violation);
                violations.push(violation.clone());
                let output = self.finish(
                    skill,
                    &ctx,
                    SkillResponse::error(format!("{}: {}", violation.kind, violation.detail)),
                    started,
                    0,
                    violations,
                    request.path.as_deref(),
                );
                return Ok(output);
            }
        }

        let response = match run_executor(
            Arc::clone(executor),
            Arc::clone(&ctx),
            self.policy.cpu_timeout,
            request.clone(),
        )
        .await
        {
            Ok(response) => response,
            Err(Error::Timeout(elapsed)) => {
                let violation = Violation::new(
                    VIOLATION_CPU_TIMEOUT,
                    format!("skill {} exceeded {elapsed:?}", skill.name),
                );
                self.record_violation(&violation);
                self.emit_audit(skill, request.path.as_deref(), false);
                return Err(Error::Timeout(elapsed));
            }
            Err(other) => {
                self.emit_audit(skill, request.path.as_deref(), false);
                return Err(other);
            }
        };

        let memory_used = ctx.take_memory_used();
        let response = match self.policy.memory_limit {
            Some(limit) if memory_used > limit => {
                let violation = Violation::new(
                    VIOLATION_MEMORY_LIMIT,
                    format!("used {memory_used} bytes, limit {limit}"),
                );
                self.record_violation(&violation);
                violations.push(violation);
                SkillResponse::error(format!("memory limit exceeded: {memory_used} > {limit}"))
            }
            _ => response,
        };

        Ok(self.finish(
            skill,
            &ctx,
            response,
            started,
            memory_used,
            violations,
            request.path.as_deref(),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        skill: &Skill,
        ctx: &SkillContext,
        response: SkillResponse,
        started: Instant,
        memory_used: u64,
        violations: Vec<Violation>,
        request_path: Option<&str>,
    ) -> SandboxOutput {
        let stdout = ctx.take_stdout();
        let stderr = ctx.take_stderr();
        let output = SandboxOutput {
            stdout: if self.policy.capture_stdout { stdout } else { String::new() },
            stderr: if self.policy.capture_stderr { stderr } else { String::new() },
            cpu_time: started.elapsed(),
            memory_used,
            violations,
            skill_name: skill.name.clone(),
            skill_version: skill.version.clone(),
            response,
        };
        self.emit_audit(skill, request_path, output.success());
        output
    }

    fn emit_audit(&self, skill: &Skill, request_path: Option<&str>, success: bool) {
        if let Some(sink) = &self.audit {
            let mut record = AuditRecord::new(
                AuditOperation::SkillExecute,
                "sandbox",
                request_path.unwrap_or(&skill.name),
            );
            record.success = success;
            audit::emit(sink.as_ref(), record);
        }
    }

    /// Inspect the request's `path` field against the host-FS policy.
    fn check_request_path(&self, request: &SkillRequest) -> Option<Violation> {
        let original = request.path.as_deref()?;
        let normalized = path::normalize(original);

        for candidate in [original, normalized.as_str()] {
            if candidate.contains("..") {
                return Some(Violation::new(
                    VIOLATION_HOST_FS,
                    format!("path {candidate:?} contains a parent traversal"),
                ));
            }
            let lower = candidate.replace('\\', "/").to_ascii_lowercase();
            for prefix in DENIED_PREFIXES {
                if path::is_path_prefix(prefix, &lower) {
                    return Some(Violation::new(
                        VIOLATION_SYSTEM_PATH,
                        format!("path {candidate:?} is under denied prefix {prefix}"),
                    ));
                }
            }
        }

        if normalized.starts_with('/') && !path::is_path_prefix(&self.virtual_root, &normalized) {
            return Some(Violation::new(
                VIOLATION_HOST_FS,
                format!("absolute path {normalized:?} is outside the virtual root"),
            ));
        }
        None
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("policy", &self.policy)
            .field("virtual_root", &self.virtual_root)
            .finish_non_exhaustive()
    }
}
