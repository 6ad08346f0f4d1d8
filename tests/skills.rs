mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::Fixture;
use serde_json::{json, Value};
use toolfs::skill::{
    LoadOptions, MemorySkillExecutor, SandboxPolicy, Skill, SkillContext, SkillExecutor,
    SkillRequest, SkillResponse,
};
use toolfs::Error;

/// Serves a tiny virtual tree: `greeting.txt` plus a directory listing.
struct TreeExecutor;

#[async_trait]
impl SkillExecutor for TreeExecutor {
    async fn execute(&self, _ctx: Arc<SkillContext>, request: SkillRequest) -> SkillResponse {
        let rel = request.data_str("relative_path").unwrap_or_default();
        match request.operation.as_str() {
            "read_file" if rel == "greeting.txt" => {
                SkillResponse::ok(Value::String("hello from the skill".to_owned()))
            }
            "read_file" => SkillResponse::error(format!("no such entry {rel}")),
            "write_file" => SkillResponse::ok(json!({"written": rel})),
            "list_dir" => SkillResponse::ok(json!({"entries": ["greeting.txt"]})),
            other => SkillResponse::error(format!("unsupported {other}")),
        }
    }
}

struct SleepyExecutor(Duration);

#[async_trait]
impl SkillExecutor for SleepyExecutor {
    async fn execute(&self, _ctx: Arc<SkillContext>, _request: SkillRequest) -> SkillResponse {
        tokio::time::sleep(self.0).await;
        SkillResponse::ok(Value::String("finally".to_owned()))
    }
}

struct PanickyExecutor;

#[async_trait]
impl SkillExecutor for PanickyExecutor {
    async fn execute(&self, _ctx: Arc<SkillContext>, _request: SkillRequest) -> SkillResponse {
        panic!("executor fault");
    }
}

#[tokio::test]
async fn fs_operations_route_through_a_skill_mount() {
    let fixture = Fixture::new();
    fixture
        .fs
        .load_skill(Skill::code("tree", "1.0.0", Arc::new(TreeExecutor)), LoadOptions::default())
        .await
        .expect("load");
    fixture.fs.mount_skill("/toolfs/tree", "tree").expect("mount");

    let bytes = fixture.fs.read_file("/toolfs/tree/greeting.txt", None).await.expect("read");
    assert_eq!(bytes, b"hello from the skill");

    let entries = fixture.fs.list_dir("/toolfs/tree", None).await.expect("list");
    assert_eq!(entries, vec!["greeting.txt".to_owned()]);

    fixture.fs.write_file("/toolfs/tree/out.txt", b"payload", None).await.expect("write");

    let err = fixture.fs.read_file("/toolfs/tree/missing", None).await.unwrap_err();
    assert!(matches!(err, Error::Skill(_)));
}

#[tokio::test]
async fn skill_mount_wins_over_local_mount_at_the_same_prefix() {
    let fixture = Fixture::new();
    fixture.write_host("shadowed/greeting.txt", "from disk");
    fixture
        .fs
        .load_skill(Skill::code("tree", "1.0.0", Arc::new(TreeExecutor)), LoadOptions::default())
        .await
        .expect("load");
    fixture.fs.mount_skill("/toolfs/data/shadowed", "tree").expect("mount over local");

    let bytes =
        fixture.fs.read_file("/toolfs/data/shadowed/greeting.txt", None).await.expect("read");
    assert_eq!(bytes, b"hello from the skill");

    fixture.fs.unmount_skill("/toolfs/data/shadowed").expect("unmount");
    let bytes =
        fixture.fs.read_file("/toolfs/data/shadowed/greeting.txt", None).await.expect("read");
    assert_eq!(bytes, b"from disk");
}

#[tokio::test]
async fn skill_timeout_returns_promptly_and_drops_the_result() {
    let fixture = Fixture::new();
    fixture
        .fs
        .load_skill(
            Skill::code("sleepy", "1.0.0", Arc::new(SleepyExecutor(Duration::from_millis(200)))),
            LoadOptions { timeout: Some(Duration::from_millis(50)), ..LoadOptions::default() },
        )
        .await
        .expect("load");
    fixture.fs.mount_skill("/toolfs/sleepy", "sleepy").expect("mount");

    let started = Instant::now();
    let err = fixture.fs.read_file("/toolfs/sleepy/x", None).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert!(started.elapsed() < Duration::from_millis(150));
}

#[tokio::test]
async fn skill_panic_is_contained_and_router_keeps_working() {
    let fixture = Fixture::new();
    fixture
        .fs
        .load_skill(Skill::code("panicky", "1.0.0", Arc::new(PanickyExecutor)), LoadOptions::default())
        .await
        .expect("load");
    fixture.fs.mount_skill("/toolfs/panicky", "panicky").expect("mount");

    let err = fixture.fs.read_file("/toolfs/panicky/x", None).await.unwrap_err();
    assert!(matches!(err, Error::SkillPanic(_)));

    // The router stays healthy after the fault.
    fixture.fs.write_file("/toolfs/data/after.txt", b"still alive", None).await.expect("write");
    let bytes = fixture.fs.read_file("/toolfs/data/after.txt", None).await.expect("read");
    assert_eq!(bytes, b"still alive");
}

#[tokio::test]
async fn sandboxed_skill_blocks_host_fs_requests() {
    let fixture = Fixture::new();
    fixture
        .fs
        .load_skill(
            Skill::code("guarded", "1.0.0", Arc::new(TreeExecutor)),
            LoadOptions {
                sandboxed: true,
                sandbox_policy: Some(SandboxPolicy::default()),
                ..LoadOptions::default()
            },
        )
        .await
        .expect("load");

    let response = fixture
        .fs
        .execute_skill("guarded", SkillRequest::new("read_file").with_path("/etc/passwd"), None)
        .await
        .expect("sandbox verdict");
    assert!(!response.success);
    let detail = response.error.expect("violation detail");
    assert!(detail.contains("blocked_system_path") || detail.contains("blocked_host_fs_access"));

    let violations = fixture.fs.skill_manager().get("guarded").expect("managed").sandbox().violations();
    assert_eq!(violations.len(), 1);
}

#[tokio::test]
async fn builtin_memory_skill_exposes_the_shared_store() {
    let fixture = Fixture::new();
    fixture
        .fs
        .load_skill(
            Skill::builtin("memory-skill", Arc::new(MemorySkillExecutor::new())),
            LoadOptions::default(),
        )
        .await
        .expect("load");

    // Write through the filesystem, read the envelope through the skill.
    fixture.fs.write_file("/toolfs/memory/shared", b"note", None).await.expect("write");

    let response = fixture
        .fs
        .execute_skill(
            "memory-skill",
            SkillRequest::new("memory_get").with_data(json!({"id": "shared"})),
            None,
        )
        .await
        .expect("execute");
    assert!(response.success);
    let envelope = response.result.expect("envelope");
    assert_eq!(envelope["content"], "note");
    assert_eq!(envelope["id"], "shared");
}

#[tokio::test]
async fn unload_tears_down_skill_mounts() {
    let fixture = Fixture::new();
    fixture
        .fs
        .load_skill(Skill::code("tree", "1.0.0", Arc::new(TreeExecutor)), LoadOptions::default())
        .await
        .expect("load");
    fixture.fs.mount_skill("/toolfs/tree", "tree").expect("mount");

    fixture.fs.unload_skill("tree").await.expect("unload");
    assert!(matches!(
        fixture.fs.read_file("/toolfs/tree/greeting.txt", None).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn mounting_an_unknown_skill_fails() {
    let fixture = Fixture::new();
    let err = fixture.fs.mount_skill("/toolfs/ghost", "ghost").unwrap_err();
    assert!(matches!(err, Error::SkillNotFound(_)));
}
