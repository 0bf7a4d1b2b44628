//! LocalSandbox integration tests against real host processes.
//!
//! Each test boots its own sandbox in an isolated temporary root.
#![cfg(unix)]

use std::time::Duration;

use launchpad_core::{project::starter_project, FileSystemTree};
use launchpad_sandbox::{LocalSandboxFactory, Process, Sandbox, SandboxError, SandboxFactory};
use rstest::rstest;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn sh(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

async fn collect(process: Process) -> (String, i32) {
    let (mut output, exit) = process.into_parts();
    let mut text = String::new();
    while let Some(chunk) = output.next_chunk().await {
        text.push_str(&chunk);
    }
    let code = exit.wait().await.expect("exit code");
    (text, code)
}

// ---------------------------------------------------------------------------
// Boot and mount
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mount_writes_starter_project_into_root() {
    let sandbox = LocalSandboxFactory::new().boot().await.expect("boot");
    sandbox.mount(&starter_project()).await.expect("mount");

    let root = sandbox.root().expect("local sandbox has a root");
    let manifest = std::fs::read_to_string(root.join("package.json")).expect("manifest");
    assert!(manifest.contains("\"nodemon index.js\""));
    assert!(root.join("index.js").is_file());
    assert!(
        !root.join("index.js.launchpad.tmp").exists(),
        "temporary files must be renamed away"
    );
}

#[tokio::test]
async fn mount_creates_nested_and_empty_directories() {
    let tree = FileSystemTree::new()
        .with_directory(
            "src",
            FileSystemTree::new().with_file("app.js", "export default 1;\n"),
        )
        .with_directory("public", FileSystemTree::new());
    let sandbox = LocalSandboxFactory::new().boot().await.expect("boot");
    sandbox.mount(&tree).await.expect("mount");

    let root = sandbox.root().expect("root");
    assert!(root.join("public").is_dir());
    assert_eq!(
        std::fs::read_to_string(root.join("src/app.js")).expect("read"),
        "export default 1;\n"
    );
}

#[tokio::test]
async fn mount_rejects_malformed_tree() {
    let sandbox = LocalSandboxFactory::new().boot().await.expect("boot");
    let err = sandbox
        .mount(&FileSystemTree::new().with_file("..", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::MalformedTree(_)), "got: {err}");
}

#[tokio::test]
async fn boot_at_existing_file_fails() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, "x").expect("write");

    let err = LocalSandboxFactory::at(&file).boot().await.unwrap_err();
    assert!(matches!(err, SandboxError::Boot { .. }), "got: {err}");
}

#[tokio::test]
async fn boot_at_directory_keeps_it_after_drop() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let root = dir.path().join("workspace");
    {
        let sandbox = LocalSandboxFactory::at(&root).boot().await.expect("boot");
        sandbox
            .write_file("/index.js", b"console.log('edited');\n")
            .await
            .expect("write file");
    }
    assert_eq!(
        std::fs::read_to_string(root.join("index.js")).expect("read"),
        "console.log('edited');\n"
    );
}

#[tokio::test]
async fn write_file_rejects_escaping_paths() {
    let sandbox = LocalSandboxFactory::new().boot().await.expect("boot");
    let err = sandbox.write_file("../outside.txt", b"x").await.unwrap_err();
    assert!(matches!(err, SandboxError::InvalidPath { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

#[tokio::test]
async fn spawn_runs_in_root_and_merges_stdout_and_stderr() {
    let sandbox = LocalSandboxFactory::new().boot().await.expect("boot");
    sandbox
        .write_file("marker.txt", b"inside\n")
        .await
        .expect("write");

    let process = sandbox
        .spawn("sh", &sh("cat marker.txt; echo warn 1>&2"))
        .await
        .expect("spawn");
    assert_eq!(process.command(), "sh -c cat marker.txt; echo warn 1>&2");

    let (text, code) = collect(process).await;
    assert_eq!(code, 0);
    assert!(text.contains("inside\n"), "stdout missing: {text:?}");
    assert!(text.contains("warn\n"), "stderr missing: {text:?}");
}

#[tokio::test]
async fn stdout_chunks_keep_their_order() {
    let sandbox = LocalSandboxFactory::new().boot().await.expect("boot");
    let process = sandbox
        .spawn("sh", &sh("for i in 1 2 3 4 5; do echo line-$i; done"))
        .await
        .expect("spawn");
    let (text, _) = collect(process).await;
    assert_eq!(text, "line-1\nline-2\nline-3\nline-4\nline-5\n");
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(127)]
#[tokio::test]
async fn exit_code_is_reported(#[case] code: i32) {
    let sandbox = LocalSandboxFactory::new().boot().await.expect("boot");
    let process = sandbox
        .spawn("sh", &sh(&format!("exit {code}")))
        .await
        .expect("spawn");
    let (_, got) = collect(process).await;
    assert_eq!(got, code);
}

#[tokio::test]
async fn spawning_missing_binary_is_a_spawn_error() {
    let sandbox = LocalSandboxFactory::new().boot().await.expect("boot");
    let err = sandbox
        .spawn("launchpad-definitely-not-installed", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::Spawn { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn teardown_kills_running_processes() {
    let sandbox = LocalSandboxFactory::new().boot().await.expect("boot");
    let process = sandbox.spawn("sleep", &["30".to_string()]).await.expect("spawn");
    let (_, exit) = process.into_parts();

    sandbox.teardown().await.expect("teardown");
    let code = tokio::time::timeout(Duration::from_secs(5), exit.wait())
        .await
        .expect("process should die promptly")
        .expect("exit code");
    assert!(code < 0, "killed process should report a signal, got {code}");

    let err = sandbox.spawn("true", &[]).await.unwrap_err();
    assert!(matches!(err, SandboxError::TornDown), "got: {err}");
}

/// Read chunks until `needle` shows up; returns everything read.
async fn read_until(output: &mut launchpad_sandbox::OutputStream, needle: &str) -> String {
    let mut text = String::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !text.contains(needle) {
            match output.next_chunk().await {
                Some(chunk) => text.push_str(&chunk),
                None => break,
            }
        }
    })
    .await
    .expect("output should arrive promptly");
    text
}

/// Resolves `true` once the stream has closed, `false` on timeout.
async fn stream_closes(output: &mut launchpad_sandbox::OutputStream, within: Duration) -> bool {
    tokio::time::timeout(within, async { while output.next_chunk().await.is_some() {} })
        .await
        .is_ok()
}

#[cfg(target_os = "linux")]
fn is_running(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // Zombies hold no resources; only count live states.
        Ok(stat) => !stat.contains(") Z"),
        Err(_) => false,
    }
}

#[tokio::test]
async fn teardown_kills_background_descendants() {
    let sandbox = LocalSandboxFactory::new().boot().await.expect("boot");
    let process = sandbox
        .spawn("sh", &sh("sleep 300 & echo $!; wait"))
        .await
        .expect("spawn");
    let (mut output, exit) = process.into_parts();
    let first = read_until(&mut output, "\n").await;
    let grandchild: u32 = first.trim().parse().expect("background pid");

    sandbox.teardown().await.expect("teardown");
    let code = tokio::time::timeout(Duration::from_secs(5), exit.wait())
        .await
        .expect("wrapper should die promptly")
        .expect("exit code");
    assert!(code < 0, "killed wrapper should report a signal, got {code}");
    assert!(
        stream_closes(&mut output, Duration::from_secs(5)).await,
        "no descendant may keep the output pipe open after teardown"
    );

    #[cfg(target_os = "linux")]
    {
        let mut alive = true;
        for _ in 0..50 {
            alive = is_running(grandchild);
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(!alive, "background sleep {grandchild} survived teardown");
    }
    #[cfg(not(target_os = "linux"))]
    let _ = grandchild;
}

#[tokio::test]
async fn exit_is_reported_while_a_descendant_holds_output() {
    let sandbox = LocalSandboxFactory::new().boot().await.expect("boot");
    let process = sandbox
        .spawn("sh", &sh("echo done; sleep 300 & exit 0"))
        .await
        .expect("spawn");
    let (mut output, exit) = process.into_parts();

    let code = tokio::time::timeout(Duration::from_secs(5), exit.wait())
        .await
        .expect("exit code should not wait for descendants")
        .expect("exit code");
    assert_eq!(code, 0);
    assert!(read_until(&mut output, "done\n").await.contains("done\n"));
    assert!(
        !stream_closes(&mut output, Duration::from_millis(300)).await,
        "background sleep still holds the pipe"
    );

    sandbox.teardown().await.expect("teardown");
    assert!(stream_closes(&mut output, Duration::from_secs(5)).await);
}

#[tokio::test]
async fn dropping_the_sandbox_kills_its_process_groups() {
    let sandbox = LocalSandboxFactory::new().boot().await.expect("boot");
    let process = sandbox
        .spawn("sh", &sh("sleep 300 & echo started; wait"))
        .await
        .expect("spawn");
    let (mut output, _exit) = process.into_parts();
    read_until(&mut output, "started\n").await;

    drop(sandbox);
    assert!(stream_closes(&mut output, Duration::from_secs(5)).await);
}
