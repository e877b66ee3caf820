//! End-to-end properties of the agent loop and the ball store.
//!
//! Runs the orchestrator against a real `.juggle/` project in a temp dir with
//! a scripted agent, plus one CLI check through the built binary.

use std::process::Command;
use std::time::Duration;

use juggle::core::backoff::wait_time;
use juggle::core::ball::{BallState, Priority, Transition};
use juggle::core::run::RunStop;
use juggle::core::short_id::{compute_minimal_unique_ids, resolve_by_prefix};
use juggle::error::{JuggleError, find_juggle_error};
use juggle::exit_codes;
use juggle::io::lock::SessionLock;
use juggle::io::store::NewBall;
use juggle::orchestrator::{Orchestrator, RunConfig};
use juggle::test_support::{
    RecordingSleeper, ScriptedRunner, ScriptedTurn, StaticPrompts, TestProject, ball,
};

fn run_config(session: &str, max_iterations: u32) -> RunConfig {
    RunConfig {
        max_iterations,
        ..RunConfig::from_config(&Default::default(), session)
    }
}

#[test]
fn backoff_doubles_to_cap_and_hint_adds_buffer() {
    let expected = [30, 60, 120, 240, 480, 960];
    for (retry, secs) in expected.iter().enumerate() {
        assert_eq!(
            wait_time(None, retry as u32),
            Duration::from_secs(*secs),
            "retry {retry}"
        );
    }
    assert_eq!(wait_time(None, 9), Duration::from_secs(960));
    for retry in 0..6 {
        assert_eq!(
            wait_time(Some(Duration::from_secs(42)), retry),
            Duration::from_secs(47)
        );
    }
}

#[test]
fn closing_a_dependency_cycle_is_rejected_and_not_persisted() {
    let project = TestProject::new().expect("project");
    let store = project.store();
    let a = store.create("A", Priority::Medium).expect("a");
    let b = store.create("B", Priority::Medium).expect("b");
    let c = store.create("C", Priority::Medium).expect("c");
    store.add_dependency(&a.id, &b.id).expect("a -> b");
    store.add_dependency(&b.id, &c.id).expect("b -> c");

    let before = std::fs::read_to_string(&project.paths().balls_path).expect("read");
    let err = store.add_dependency(&c.id, &a.id).unwrap_err();
    match find_juggle_error(&err) {
        Some(JuggleError::Cycle { path }) => {
            assert_eq!(path.first(), path.last());
            assert_eq!(path.len(), 4);
        }
        other => panic!("expected cycle, got {other:?}"),
    }
    let after = std::fs::read_to_string(&project.paths().balls_path).expect("read");
    assert_eq!(before, after);
}

#[test]
fn minimal_ids_depend_on_display_grouping() {
    let three = compute_minimal_unique_ids(&["abc123", "abc456", "xyz789"]);
    assert_eq!(three["abc123"], "abc1");
    assert_eq!(three["abc456"], "abc4");
    assert_eq!(three["xyz789"], "x");

    let two = compute_minimal_unique_ids(&["abc123", "xyz789"]);
    assert_eq!(two["abc123"], "a");
    assert_eq!(compute_minimal_unique_ids(&["abc123", "xyz789"]), two);
}

#[test]
fn ambiguous_prefix_never_picks_one() {
    let balls = vec![ball("task-abc1"), ball("task-abc2")];
    let err = resolve_by_prefix(&balls, "task-a").unwrap_err();
    assert_eq!(
        err,
        JuggleError::Ambiguous {
            query: "task-a".to_string(),
            candidates: vec!["task-abc1".to_string(), "task-abc2".to_string()],
        }
    );
}

#[test]
fn complete_without_progress_is_not_trusted() {
    let project = TestProject::new().expect("project");
    let session = project.create_session("s").expect("session");
    let work = project
        .store()
        .create_in_session(&session, NewBall::new("Work", Priority::High))
        .expect("ball");

    // First turn claims completion without logging progress and leaves the
    // ball open, so the loop must go around again.
    let runner = ScriptedRunner::new(
        project.root(),
        vec![
            ScriptedTurn::complete().with_transition(&work.id, Transition::Start),
            ScriptedTurn::complete()
                .with_progress("finished work")
                .with_transition(&work.id, Transition::Complete),
        ],
    );
    let sleeper = RecordingSleeper::default();
    let prompts = StaticPrompts::new("prompt");
    let orchestrator = Orchestrator::new(
        project.store(),
        project.sessions(),
        &runner,
        &prompts,
        project.progress(),
        &sleeper,
    );

    let result = orchestrator.run(&run_config("s", 5), |_| {}).expect("run");
    assert_eq!(result.stop, RunStop::Complete);
    assert_eq!(result.iterations, 2);
    runner.assert_drained();

    let log = project.progress().tail("s", 100).expect("tail");
    assert!(
        log.iter()
            .any(|line| line.contains("signaled complete but no progress was recorded"))
    );
}

#[test]
fn unbacked_complete_runs_out_of_iterations() {
    let project = TestProject::new().expect("project");
    let session = project.create_session("s").expect("session");
    project
        .store()
        .create_in_session(&session, NewBall::new("Work", Priority::High))
        .expect("ball");

    let runner = ScriptedRunner::new(
        project.root(),
        vec![ScriptedTurn::complete(), ScriptedTurn::complete()],
    );
    let sleeper = RecordingSleeper::default();
    let prompts = StaticPrompts::new("prompt");
    let orchestrator = Orchestrator::new(
        project.store(),
        project.sessions(),
        &runner,
        &prompts,
        project.progress(),
        &sleeper,
    );

    let result = orchestrator.run(&run_config("s", 2), |_| {}).expect("run");
    assert_eq!(result.stop, RunStop::MaxIterationsReached);
    assert_eq!(result.iterations, 2);
    assert!(result.as_error().is_none());
}

#[test]
fn second_run_on_locked_session_fails_and_lock_is_released_after() {
    let project = TestProject::new().expect("project");
    let session = project.create_session("s").expect("session");
    let work = project
        .store()
        .create_in_session(&session, NewBall::new("Work", Priority::High))
        .expect("ball");
    let lock_path = project.paths().session("s").lock_path;

    let runner = ScriptedRunner::new(
        project.root(),
        vec![ScriptedTurn::complete()
            .with_progress("done")
            .with_transition(&work.id, Transition::Start)
            .with_transition(&work.id, Transition::Complete)],
    );
    let sleeper = RecordingSleeper::default();
    let prompts = StaticPrompts::new("prompt");
    let orchestrator = Orchestrator::new(
        project.store(),
        project.sessions(),
        &runner,
        &prompts,
        project.progress(),
        &sleeper,
    );

    {
        let _held = SessionLock::acquire(&lock_path, "s").expect("hold lock");
        let err = orchestrator.run(&run_config("s", 1), |_| {}).unwrap_err();
        assert!(matches!(
            find_juggle_error(&err),
            Some(JuggleError::AlreadyLocked { session, .. }) if session == "s"
        ));
        assert_eq!(prompts.calls(), 0);
    }

    let result = orchestrator.run(&run_config("s", 1), |_| {}).expect("run");
    assert_eq!(result.stop, RunStop::Complete);
    SessionLock::acquire(&lock_path, "s").expect("released after run");
}

#[test]
fn silent_agent_finishing_last_ball_completes_run() {
    let project = TestProject::new().expect("project");
    let session = project.create_session("s").expect("session");
    let store = project.store();
    let done = store
        .create_in_session(&session, NewBall::new("Done", Priority::Low))
        .expect("done");
    store.transition(&done.id, Transition::Start).expect("start");
    store.transition(&done.id, Transition::Complete).expect("complete");
    let open = store
        .create_in_session(&session, NewBall::new("Open", Priority::High))
        .expect("open");

    let runner = ScriptedRunner::new(
        project.root(),
        vec![ScriptedTurn::silent()
            .with_progress("finished open ball")
            .with_transition(&open.id, Transition::Start)
            .with_transition(&open.id, Transition::Complete)],
    );
    let sleeper = RecordingSleeper::default();
    let prompts = StaticPrompts::new("prompt");
    let orchestrator = Orchestrator::new(
        project.store(),
        project.sessions(),
        &runner,
        &prompts,
        project.progress(),
        &sleeper,
    );

    let result = orchestrator.run(&run_config("s", 5), |_| {}).expect("run");
    assert_eq!(result.stop, RunStop::Complete);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.counts.total, 2);
    assert_eq!(result.counts.complete, 2);
    assert!(
        store
            .session_balls("s")
            .expect("balls")
            .iter()
            .all(|b| b.state == BallState::Complete)
    );
}

#[test]
fn cli_ambiguous_prefix_exits_invalid_and_lists_candidates() {
    let project = TestProject::new().expect("project");
    let store = project.store();
    for title in ["One", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight"] {
        store.create(title, Priority::Medium).expect("create");
    }
    // Every id shares the project slug, so the slug alone is ambiguous.
    let slug_prefix = {
        let id = &store.load_active().expect("load")[0].id;
        let (slug, _) = id.rsplit_once('-').expect("slug-hash");
        format!("{slug}-")
    };

    let output = Command::new(env!("CARGO_BIN_EXE_juggle"))
        .arg("-C")
        .arg(project.root())
        .arg("start")
        .arg(&slug_prefix)
        .output()
        .expect("juggle start");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ambiguous id"), "stderr: {stderr}");
    assert!(stderr.contains("matches 8"), "stderr: {stderr}");
}
