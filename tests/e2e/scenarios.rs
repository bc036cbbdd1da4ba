use std::thread;
use std::time::Duration;

use super::harness::TestContext;

pub struct Scenario {
    pub name: &'static str,
    pub run: fn(&TestContext) -> Result<(), String>,
}

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "uncontended_acquire_runs_child_and_cleans_up",
            run: scenario_uncontended_acquire,
        },
        Scenario {
            name: "contended_acquire_exhausts_retries",
            run: scenario_contended_acquire,
        },
        Scenario {
            name: "child_exit_code_is_propagated",
            run: scenario_child_exit_code_propagated,
        },
        Scenario {
            name: "stale_lock_is_stolen_even_with_zero_retries",
            run: scenario_steals_stale_lock_at_zero_retries,
        },
        Scenario {
            name: "missing_child_command_is_a_usage_error",
            run: scenario_missing_command_is_usage_error,
        },
    ]
}

fn scenario_uncontended_acquire(ctx: &TestContext) -> Result<(), String> {
    let dir = ctx.unique_dir("uncontended")?;
    let lockfile = dir.join("x.lock");

    let output = ctx.run_filelock(
        &[lockfile.to_str().unwrap(), "--", "true"],
        &dir,
    )?;
    output.assert_exit_code(0)?;

    if lockfile.exists() {
        return Err("lockfile should have been removed after the child exited".to_string());
    }
    Ok(())
}

fn scenario_contended_acquire(ctx: &TestContext) -> Result<(), String> {
    let dir = ctx.unique_dir("contended")?;
    let lockfile = dir.join("x.lock");

    let mut holder = ctx.spawn_filelock(
        &[lockfile.to_str().unwrap(), "--", "sleep", "2"],
        &dir,
    )?;
    // Give the holder time to actually win the race before we contend.
    thread::sleep(Duration::from_millis(300));

    let output = ctx.run_filelock(
        &[
            lockfile.to_str().unwrap(),
            "--retries",
            "1",
            "--min-sleep",
            "0.05",
            "--max-sleep",
            "0.05",
            "--sleep-inc",
            "0.05",
            "--poll-retries",
            "1",
            "--poll-max-sleep",
            "0.02",
            "--",
            "true",
        ],
        &dir,
    )?;

    let _ = holder.kill();
    let _ = holder.wait();

    output.assert_exit_code(3)
}

fn scenario_child_exit_code_propagated(ctx: &TestContext) -> Result<(), String> {
    let dir = ctx.unique_dir("child-exit-code")?;
    let lockfile = dir.join("x.lock");

    let output = ctx.run_filelock(
        &[lockfile.to_str().unwrap(), "--", "sh", "-c", "exit 7"],
        &dir,
    )?;
    output.assert_exit_code(7)
}

fn scenario_steals_stale_lock_at_zero_retries(ctx: &TestContext) -> Result<(), String> {
    let dir = ctx.unique_dir("steal-zero-retries")?;
    let lockfile = dir.join("x.lock");

    // Simulate a crashed peer's leftover lockfile with an old mtime.
    std::fs::write(&lockfile, b"host=nobody\npid=1\n")
        .map_err(|e| format!("failed to seed stale lockfile: {e}"))?;
    let old = std::time::SystemTime::now() - Duration::from_secs(60);
    let file = std::fs::File::open(&lockfile).map_err(|e| e.to_string())?;
    file.set_modified(old).map_err(|e| e.to_string())?;
    drop(file);

    let output = ctx.run_filelock(
        &[
            lockfile.to_str().unwrap(),
            "--retries",
            "0",
            "--max-age",
            "1",
            "--suspend",
            "0",
            "--",
            "true",
        ],
        &dir,
    )?;

    output.assert_exit_code(0)
}

fn scenario_missing_command_is_usage_error(ctx: &TestContext) -> Result<(), String> {
    let dir = ctx.unique_dir("missing-command")?;
    let lockfile = dir.join("x.lock");

    let output = ctx.run_filelock(&[lockfile.to_str().unwrap()], &dir)?;
    if output.status == 0 {
        return Err("expected clap usage error for a missing child command".to_string());
    }
    Ok(())
}
