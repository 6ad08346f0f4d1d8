use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::ScriptedExecutor;
use crate::skill::sandbox::{
    VIOLATION_CPU_TIMEOUT, VIOLATION_HOST_FS, VIOLATION_MEMORY_LIMIT, VIOLATION_SYSTEM_PATH,
};
use crate::skill::{
    Sandbox, SandboxPolicy, Skill, SkillContext, SkillExecutor, SkillRequest, SkillResponse,
};
use crate::Error;

fn skill(name: &str) -> Skill {
    Skill::code(name, "1.0.0", Arc::new(ScriptedExecutor::replying(json!("ok"))))
}

fn executor_of(skill: &Skill) -> Arc<dyn SkillExecutor> {
    skill.executor.clone().expect("executor")
}

#[tokio::test]
async fn blocked_system_path_never_reaches_the_executor() {
    let sandbox = Sandbox::new(SandboxPolicy::default(), "/toolfs");
    let skill = skill("probe");
    let ctx = Arc::new(SkillContext::new("probe"));

    let request = SkillRequest::new("read_file").with_path("/etc/passwd");
    let output = sandbox.execute(&executor_of(&skill), ctx, &skill, request).await.expect("run");

    assert!(!output.success());
    assert_eq!(output.violations.len(), 1);
    assert!(matches!(
        output.violations[0].kind.as_str(),
        VIOLATION_SYSTEM_PATH | VIOLATION_HOST_FS
    ));
    // The scripted "ok" result was discarded.
    assert!(output.response.result.is_none());
    assert_eq!(sandbox.violations().len(), 1);
}

#[tokio::test]
async fn parent_traversal_is_blocked() {
    let sandbox = Sandbox::new(SandboxPolicy::default(), "/toolfs");
    let skill = skill("probe");
    let ctx = Arc::new(SkillContext::new("probe"));

    let request = SkillRequest::new("read_file").with_path("/toolfs/../secret");
    let output = sandbox.execute(&executor_of(&skill), ctx, &skill, request).await.expect("run");

    assert!(!output.success());
    assert_eq!(output.violations[0].kind, VIOLATION_HOST_FS);
}

#[tokio::test]
async fn absolute_path_outside_root_is_blocked() {
    let sandbox = Sandbox::new(SandboxPolicy::default(), "/toolfs");
    let skill = skill("probe");
    let ctx = Arc::new(SkillContext::new("probe"));

    let request = SkillRequest::new("read_file").with_path("/home/user/file");
    let output = sandbox.execute(&executor_of(&skill), ctx, &skill, request).await.expect("run");

    assert!(!output.success());
    assert_eq!(output.violations[0].kind, VIOLATION_HOST_FS);
}

#[tokio::test]
async fn paths_under_the_root_pass() {
    let sandbox = Sandbox::new(SandboxPolicy::default(), "/toolfs");
    let skill = skill("probe");
    let ctx = Arc::new(SkillContext::new("probe"));

    let request = SkillRequest::new("read_file").with_path("/toolfs/data/x");
    let output = sandbox.execute(&executor_of(&skill), ctx, &skill, request).await.expect("run");

    assert!(output.success());
    assert!(output.violations.is_empty());
}

#[tokio::test]
async fn allow_host_fs_skips_path_checks() {
    let policy = SandboxPolicy { allow_host_fs: true, ..SandboxPolicy::default() };
    let sandbox = Sandbox::new(policy, "/toolfs");
    let skill = skill("probe");
    let ctx = Arc::new(SkillContext::new("probe"));

    let request = SkillRequest::new("read_file").with_path("/etc/passwd");
    let output = sandbox.execute(&executor_of(&skill), ctx, &skill, request).await.expect("run");
    assert!(output.success());
}

#[tokio::test]
async fn cpu_timeout_is_reported_with_violation() {
    let policy =
        SandboxPolicy { cpu_timeout: Duration::from_millis(50), ..SandboxPolicy::default() };
    let sandbox = Sandbox::new(policy, "/toolfs");
    let skill = Skill::code(
        "slow",
        "1.0.0",
        Arc::new(ScriptedExecutor::slow(Duration::from_millis(200))),
    );
    let ctx = Arc::new(SkillContext::new("slow"));

    let request = SkillRequest::new("work").with_path("/toolfs/slow/run");
    let err = sandbox
        .execute(&executor_of(&skill), ctx, &skill, request)
        .await
        .expect_err("times out");

    assert!(matches!(err, Error::Timeout(_)));
    let history = sandbox.violations();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, VIOLATION_CPU_TIMEOUT);
}

struct HungryExecutor;

#[async_trait]
impl SkillExecutor for HungryExecutor {
    async fn execute(&self, ctx: Arc<SkillContext>, _request: SkillRequest) -> SkillResponse {
        ctx.report_memory_used(64 * 1024 * 1024);
        SkillResponse::ok(Value::String("done".to_owned()))
    }
}

#[tokio::test]
async fn advisory_memory_limit_fails_the_call() {
    let policy = SandboxPolicy { memory_limit: Some(1024), ..SandboxPolicy::default() };
    let sandbox = Sandbox::new(policy, "/toolfs");
    let skill = Skill::code("hungry", "1.0.0", Arc::new(HungryExecutor));
    let ctx = Arc::new(SkillContext::new("hungry"));

    let request = SkillRequest::new("work").with_path("/toolfs/hungry/run");
    let output = sandbox.execute(&executor_of(&skill), ctx, &skill, request).await.expect("run");

    assert!(!output.success());
    assert_eq!(output.violations[0].kind, VIOLATION_MEMORY_LIMIT);
    assert_eq!(output.memory_used, 64 * 1024 * 1024);
}

struct ChattyExecutor;

#[async_trait]
impl SkillExecutor for ChattyExecutor {
    async fn execute(&self, ctx: Arc<SkillContext>, _request: SkillRequest) -> SkillResponse {
        ctx.write_stdout("progress line\n");
        ctx.write_stderr("warning line\n");
        SkillResponse::ok(Value::Null)
    }
}

#[tokio::test]
async fn stdio_is_captured_per_call() {
    let sandbox = Sandbox::new(SandboxPolicy::default(), "/toolfs");
    let skill = Skill::code("chatty", "1.0.0", Arc::new(ChattyExecutor));
    let ctx = Arc::new(SkillContext::new("chatty"));

    let request = SkillRequest::new("work").with_path("/toolfs/chatty/run");
    let output = sandbox
        .execute(&executor_of(&skill), Arc::clone(&ctx), &skill, request.clone())
        .await
        .expect("run");
    assert_eq!(output.stdout, "progress line\n");
    assert_eq!(output.stderr, "warning line\n");
    assert_eq!(output.skill_name, "chatty");
    assert_eq!(output.skill_version, "1.0.0");

    // Buffers were drained; the next call starts clean.
    let output = sandbox.execute(&executor_of(&skill), ctx, &skill, request).await.expect("run");
    assert_eq!(output.stdout, "progress line\n");
}

#[tokio::test]
async fn capture_flags_suppress_streams() {
    let policy = SandboxPolicy {
        capture_stdout: false,
        capture_stderr: false,
        ..SandboxPolicy::default()
    };
    let sandbox = Sandbox::new(policy, "/toolfs");
    let skill = Skill::code("chatty", "1.0.0", Arc::new(ChattyExecutor));
    let ctx = Arc::new(SkillContext::new("chatty"));

    let request = SkillRequest::new("work").with_path("/toolfs/chatty/run");
    let output = sandbox.execute(&executor_of(&skill), ctx, &skill, request).await.expect("run");
    assert!(output.stdout.is_empty());
    assert!(output.stderr.is_empty());
}
