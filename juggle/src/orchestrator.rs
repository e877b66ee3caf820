//! The agent iteration loop behind `juggle run`.
//!
//! One run drives at most one agent invocation at a time for one session.
//! Agent signals are self-reported and only trusted when the session's
//! progress log grew during the iteration; independently of any signal, the
//! loop stops once every targeted ball is terminal.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::core::aggregate::{AggregateCounts, aggregate};
use crate::core::backoff::wait_time;
use crate::core::ball::ModelSize;
use crate::core::progress::progress_advanced;
use crate::core::run::{RunResult, RunStop};
use crate::core::types::{AgentMode, AgentSignal, PermissionLevel};
use crate::error::{JuggleError, find_juggle_error};
use crate::io::agent::{AgentRequest, AgentRunner};
use crate::io::artifacts::{write_last_output, write_last_run};
use crate::io::config::JuggleConfig;
use crate::io::init::SessionPaths;
use crate::io::lock::SessionLock;
use crate::io::progress_log::ProgressSink;
use crate::io::prompt::PromptGenerator;
use crate::io::session::SessionStore;
use crate::io::store::BallStore;

/// Parameters for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub session_id: String,
    /// Full id or unique prefix of a single session ball to target.
    pub ball_filter: Option<String>,
    pub max_iterations: u32,
    pub permission: PermissionLevel,
    pub mode: AgentMode,
    pub iteration_timeout: Option<Duration>,
    pub iteration_delay: Duration,
    /// Cumulative rate-limit waiting allowed. Unbounded when unset.
    pub max_rate_limit_wait: Option<Duration>,
    pub countdown_tick: Duration,
    pub output_limit_bytes: usize,
}

impl RunConfig {
    /// Defaults from the project config; callers override per invocation.
    pub fn from_config(config: &JuggleConfig, session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            ball_filter: None,
            max_iterations: config.max_iterations,
            permission: PermissionLevel::default(),
            mode: AgentMode::default(),
            iteration_timeout: config.iteration_timeout_secs.map(Duration::from_secs),
            iteration_delay: Duration::from_secs(config.iteration_delay_secs),
            max_rate_limit_wait: config.max_rate_limit_wait_secs.map(Duration::from_secs),
            countdown_tick: Duration::from_secs(config.countdown_tick_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

/// Blocking waits, behind a seam so tests do not sleep.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Progress notifications for the caller, e.g. CLI status lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    IterationStarted {
        iteration: u32,
        max_iterations: u32,
    },
    IterationFinished {
        iteration: u32,
        signal: Option<AgentSignal>,
        advanced: bool,
        counts: AggregateCounts,
    },
    RateLimited {
        iteration: u32,
        retry: u32,
        wait: Duration,
    },
    /// Time left in the current rate-limit wait.
    Countdown { remaining: Duration },
    Warning(String),
}

/// Composes the stores, progress log, prompt generator and agent runner.
pub struct Orchestrator<'a, R, P, L, S> {
    balls: &'a BallStore,
    sessions: &'a SessionStore,
    runner: &'a R,
    prompts: &'a P,
    progress: &'a L,
    sleeper: &'a S,
}

/// Values fixed for the whole run once the session and filter resolve.
struct RunTarget {
    session_id: String,
    ball_filter: Option<String>,
    workdir: PathBuf,
    model: Option<ModelSize>,
    paths: SessionPaths,
}

impl<'a, R, P, L, S> Orchestrator<'a, R, P, L, S>
where
    R: AgentRunner,
    P: PromptGenerator,
    L: ProgressSink,
    S: Sleeper,
{
    pub fn new(
        balls: &'a BallStore,
        sessions: &'a SessionStore,
        runner: &'a R,
        prompts: &'a P,
        progress: &'a L,
        sleeper: &'a S,
    ) -> Self {
        Self {
            balls,
            sessions,
            runner,
            prompts,
            progress,
            sleeper,
        }
    }

    /// Run the loop until a terminal outcome.
    ///
    /// A missing session, an unresolvable filter, a held lock, a prompt
    /// failure or a runner that cannot be invoked are returned as errors.
    /// Every other stop, including failing ones, is a [`RunResult`]. The
    /// session lock is released on every path.
    #[instrument(skip_all, fields(session = %config.session_id))]
    pub fn run<F: FnMut(&LoopEvent)>(&self, config: &RunConfig, mut on_event: F) -> Result<RunResult> {
        let session = self.sessions.load(&config.session_id)?;
        let targets = self
            .balls
            .target_balls(&session.id, config.ball_filter.as_deref())?;
        let filtered = config.ball_filter.as_ref().and_then(|_| targets.first());
        let target = RunTarget {
            session_id: session.id.clone(),
            ball_filter: filtered.map(|ball| ball.id.clone()),
            workdir: filtered
                .map(|ball| ball.working_dir.clone())
                .unwrap_or_else(|| self.balls.paths().root.clone()),
            model: filtered
                .and_then(|ball| ball.model_size)
                .or(session.default_model),
            paths: self.balls.paths().session(&session.id),
        };

        let mut lock = SessionLock::acquire(&target.paths.lock_path, &target.session_id)?;
        info!(max_iterations = config.max_iterations, "run started");
        self.note(&target.session_id, "run started");

        let outcome = self.iterate(config, &target, &mut on_event);
        lock.release();
        let result = outcome?;

        info!(
            stop = result.stop.as_str(),
            iterations = result.iterations,
            "run finished"
        );
        self.note(
            &target.session_id,
            &format!(
                "run finished: {} after {} iteration(s)",
                result.stop.as_str(),
                result.iterations
            ),
        );
        if let Err(err) = write_last_run(&target.paths, &result) {
            warn!(err = %format!("{err:#}"), "failed to write last run");
        }
        Ok(result)
    }

    fn iterate<F: FnMut(&LoopEvent)>(
        &self,
        config: &RunConfig,
        target: &RunTarget,
        on_event: &mut F,
    ) -> Result<RunResult> {
        let session_id = target.session_id.as_str();
        let started_at = Utc::now();
        let mut iteration = 0u32;
        let mut retries = 0u32;
        let mut total_wait = Duration::ZERO;

        let finish = |iterations: u32, stop: RunStop, counts: AggregateCounts, waited: Duration| {
            RunResult {
                session_id: session_id.to_string(),
                ball_filter: target.ball_filter.clone(),
                iterations,
                stop,
                counts,
                total_wait: waited,
                started_at,
                ended_at: Utc::now(),
            }
        };

        while iteration < config.max_iterations {
            let current = iteration + 1;
            let before = self.progress.line_count(session_id)?;
            let prompt = self
                .prompts
                .generate(session_id, target.ball_filter.as_deref())?;

            on_event(&LoopEvent::IterationStarted {
                iteration: current,
                max_iterations: config.max_iterations,
            });
            debug!(iteration = current, before, "invoking agent");
            let request = AgentRequest {
                workdir: target.workdir.clone(),
                prompt,
                mode: config.mode,
                permission: config.permission,
                timeout: config.iteration_timeout,
                model: target.model,
                output_limit_bytes: config.output_limit_bytes,
            };
            let result = self.runner.run(&request).map_err(into_runner_failure)?;

            if result.rate_limited {
                let wait = wait_time(result.retry_after, retries);
                if let Some(budget) = config.max_rate_limit_wait
                    && total_wait + wait > budget
                {
                    warn!(
                        waited_secs = total_wait.as_secs(),
                        wait_secs = wait.as_secs(),
                        "rate limit wait budget exceeded"
                    );
                    self.note(
                        session_id,
                        &format!(
                            "rate limit wait budget exceeded after {}s waited",
                            total_wait.as_secs()
                        ),
                    );
                    let counts = self.counts(target)?;
                    return Ok(finish(
                        iteration,
                        RunStop::RateLimitBudgetExceeded,
                        counts,
                        total_wait,
                    ));
                }
                retries += 1;
                info!(iteration = current, retry = retries, wait_secs = wait.as_secs(), "rate limited");
                self.note(
                    session_id,
                    &format!(
                        "iteration {current}: rate limited, waiting {}s (retry {retries})",
                        wait.as_secs()
                    ),
                );
                on_event(&LoopEvent::RateLimited {
                    iteration: current,
                    retry: retries,
                    wait,
                });
                self.wait_with_countdown(wait, config.countdown_tick, on_event);
                total_wait += wait;
                continue;
            }
            retries = 0;
            iteration = current;

            if result.timed_out {
                let message = match config.iteration_timeout {
                    Some(limit) => format!("agent exceeded {}s", limit.as_secs()),
                    None => "agent timed out".to_string(),
                };
                warn!(iteration, %message, "iteration timed out");
                self.note(session_id, &format!("iteration {iteration}: timed out ({message})"));
                let counts = self.counts(target)?;
                return Ok(finish(
                    iteration,
                    RunStop::TimedOut { message },
                    counts,
                    total_wait,
                ));
            }

            if let Err(err) = write_last_output(&target.paths, &result.output) {
                warn!(err = %format!("{err:#}"), "failed to write last output");
            }

            let after = self.progress.line_count(session_id)?;
            let advanced = progress_advanced(before, after);
            let signal = result.signal();
            let counts = self.counts(target)?;
            on_event(&LoopEvent::IterationFinished {
                iteration,
                signal: signal.clone(),
                advanced,
                counts,
            });
            debug!(iteration, before, after, ?signal, "iteration finished");

            match (&signal, advanced) {
                (None, _) => {}
                (Some(signal), false) => {
                    self.warn(
                        session_id,
                        &format!(
                            "iteration {iteration}: agent signaled {} but no progress was recorded",
                            signal_name(signal)
                        ),
                        on_event,
                    );
                }
                (Some(AgentSignal::Complete), true) => {
                    if counts.all_terminal() {
                        return Ok(finish(iteration, RunStop::Complete, counts, total_wait));
                    }
                    self.warn(
                        session_id,
                        &format!(
                            "iteration {iteration}: agent signaled complete but work is incomplete ({}/{} terminal)",
                            counts.terminal, counts.total
                        ),
                        on_event,
                    );
                }
                (Some(AgentSignal::Continue), true) => {
                    self.note(
                        session_id,
                        &format!(
                            "iteration {iteration}: continuing ({}/{} terminal)",
                            counts.terminal, counts.total
                        ),
                    );
                }
                (Some(AgentSignal::Blocked(reason)), true) => {
                    let reason = if reason.trim().is_empty() {
                        "agent reported blocked".to_string()
                    } else {
                        reason.trim().to_string()
                    };
                    self.note(session_id, &format!("iteration {iteration}: blocked: {reason}"));
                    return Ok(finish(
                        iteration,
                        RunStop::Blocked { reason },
                        counts,
                        total_wait,
                    ));
                }
            }

            let counts = self.counts(target)?;
            if counts.all_terminal() {
                info!(iteration, "all targeted balls terminal");
                return Ok(finish(iteration, RunStop::Complete, counts, total_wait));
            }

            if iteration < config.max_iterations && !config.iteration_delay.is_zero() {
                self.sleeper.sleep(config.iteration_delay);
            }
        }

        let counts = self.counts(target)?;
        Ok(finish(
            iteration,
            RunStop::MaxIterationsReached,
            counts,
            total_wait,
        ))
    }

    fn counts(&self, target: &RunTarget) -> Result<AggregateCounts> {
        let balls = self
            .balls
            .target_balls(&target.session_id, target.ball_filter.as_deref())?;
        Ok(aggregate(&balls))
    }

    fn wait_with_countdown<F: FnMut(&LoopEvent)>(&self, wait: Duration, tick: Duration, on_event: &mut F) {
        let tick = if tick.is_zero() { wait } else { tick };
        let mut remaining = wait;
        while !remaining.is_zero() {
            on_event(&LoopEvent::Countdown { remaining });
            let step = remaining.min(tick);
            self.sleeper.sleep(step);
            remaining -= step;
        }
    }

    /// Best-effort progress log entry.
    fn note(&self, session_id: &str, entry: &str) {
        if let Err(err) = self.progress.append(session_id, &format!("juggle: {entry}")) {
            warn!(err = %format!("{err:#}"), "failed to append progress log");
        }
    }

    fn warn<F: FnMut(&LoopEvent)>(&self, session_id: &str, message: &str, on_event: &mut F) {
        warn!("{message}");
        self.note(session_id, &format!("warning: {message}"));
        on_event(&LoopEvent::Warning(message.to_string()));
    }
}

fn signal_name(signal: &AgentSignal) -> &'static str {
    match signal {
        AgentSignal::Complete => "complete",
        AgentSignal::Continue => "continue",
        AgentSignal::Blocked(_) => "blocked",
    }
}

fn into_runner_failure(err: anyhow::Error) -> anyhow::Error {
    if matches!(find_juggle_error(&err), Some(JuggleError::RunnerFailure(_))) {
        return err;
    }
    JuggleError::RunnerFailure(format!("{err:#}")).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ball::{BallState, Priority, Transition};
    use crate::io::store::NewBall;
    use crate::test_support::{RecordingSleeper, ScriptedRunner, ScriptedTurn, StaticPrompts, TestProject};

    fn config(session: &str, max_iterations: u32) -> RunConfig {
        RunConfig {
            max_iterations,
            countdown_tick: Duration::from_secs(15),
            ..RunConfig::from_config(&JuggleConfig::default(), session)
        }
    }

    #[test]
    fn continue_then_silent_completion_stops_complete() {
        let project = TestProject::new().expect("project");
        let session = project.create_session("s").expect("session");
        let ball = project
            .store()
            .create_in_session(&session, NewBall::new("Work", Priority::High))
            .expect("ball");

        let runner = ScriptedRunner::new(
            project.root(),
            vec![
                ScriptedTurn::continue_()
                    .with_progress("started work")
                    .with_transition(&ball.id, Transition::Start),
                ScriptedTurn::silent()
                    .with_progress("done")
                    .with_transition(&ball.id, Transition::Complete),
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

        let mut events = Vec::new();
        let result = orchestrator
            .run(&config("s", 5), |event| events.push(event.clone()))
            .expect("run");

        assert_eq!(result.stop, RunStop::Complete);
        assert_eq!(result.iterations, 2);
        assert_eq!(result.counts.complete, 1);
        runner.assert_drained();
        assert_eq!(prompts.calls(), 2);
        assert!(matches!(
            events.first(),
            Some(LoopEvent::IterationStarted { iteration: 1, max_iterations: 5 })
        ));
        assert!(project.paths().session("s").last_run_path.is_file());
        assert_eq!(SessionLock::holder(&project.paths().session("s").lock_path), None);
    }

    #[test]
    fn rate_limit_retries_without_consuming_iteration() {
        let project = TestProject::new().expect("project");
        let session = project.create_session("s").expect("session");
        let ball = project
            .store()
            .create_in_session(&session, NewBall::new("Work", Priority::High))
            .expect("ball");

        let runner = ScriptedRunner::new(
            project.root(),
            vec![
                ScriptedTurn::rate_limited(None),
                ScriptedTurn::rate_limited(Some(Duration::from_secs(10))),
                ScriptedTurn::complete()
                    .with_progress("all done")
                    .with_transition(&ball.id, Transition::Start)
                    .with_transition(&ball.id, Transition::Complete),
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

        let result = orchestrator.run(&config("s", 1), |_| {}).expect("run");
        assert_eq!(result.stop, RunStop::Complete);
        assert_eq!(result.iterations, 1);
        // 30s backoff then 10s hint + 5s buffer.
        assert_eq!(result.total_wait, Duration::from_secs(45));
        assert_eq!(sleeper.total(), Duration::from_secs(45));
        assert_eq!(
            sleeper.slept(),
            vec![
                Duration::from_secs(15),
                Duration::from_secs(15),
                Duration::from_secs(15),
            ]
        );
    }

    #[test]
    fn rate_limit_backoff_resets_after_a_normal_iteration() {
        let project = TestProject::new().expect("project");
        let session = project.create_session("s").expect("session");
        let ball = project
            .store()
            .create_in_session(&session, NewBall::new("Work", Priority::High))
            .expect("ball");

        let runner = ScriptedRunner::new(
            project.root(),
            vec![
                ScriptedTurn::rate_limited(None),
                ScriptedTurn::continue_()
                    .with_progress("started")
                    .with_transition(&ball.id, Transition::Start),
                ScriptedTurn::rate_limited(None),
                ScriptedTurn::complete()
                    .with_progress("finished")
                    .with_transition(&ball.id, Transition::Complete),
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

        let run_config = RunConfig {
            iteration_delay: Duration::ZERO,
            ..config("s", 5)
        };
        let mut waits = Vec::new();
        let result = orchestrator
            .run(&run_config, |event| {
                if let LoopEvent::RateLimited { retry, wait, .. } = event {
                    waits.push((*retry, *wait));
                }
            })
            .expect("run");

        assert_eq!(result.stop, RunStop::Complete);
        assert_eq!(result.iterations, 2);
        runner.assert_drained();
        assert_eq!(
            waits,
            vec![(1, Duration::from_secs(30)), (1, Duration::from_secs(30))]
        );
        assert_eq!(result.total_wait, Duration::from_secs(60));
        assert_eq!(sleeper.total(), Duration::from_secs(60));
    }

    #[test]
    fn rate_limit_budget_stops_before_waiting() {
        let project = TestProject::new().expect("project");
        let session = project.create_session("s").expect("session");
        project
            .store()
            .create_in_session(&session, NewBall::new("Work", Priority::High))
            .expect("ball");

        let runner = ScriptedRunner::new(
            project.root(),
            vec![
                ScriptedTurn::rate_limited(None),
                ScriptedTurn::rate_limited(None),
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

        let run_config = RunConfig {
            max_rate_limit_wait: Some(Duration::from_secs(60)),
            ..config("s", 3)
        };
        let result = orchestrator.run(&run_config, |_| {}).expect("run");
        assert_eq!(result.stop, RunStop::RateLimitBudgetExceeded);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.total_wait, Duration::from_secs(30));
        assert_eq!(
            result.as_error(),
            Some(JuggleError::RateLimitBudgetExceeded {
                iterations: 0,
                waited: Duration::from_secs(30),
            })
        );
        runner.assert_drained();
    }

    #[test]
    fn timeout_stops_and_keeps_ball_state() {
        let project = TestProject::new().expect("project");
        let session = project.create_session("s").expect("session");
        let ball = project
            .store()
            .create_in_session(&session, NewBall::new("Work", Priority::High))
            .expect("ball");

        let runner = ScriptedRunner::new(
            project.root(),
            vec![ScriptedTurn::timed_out().with_transition(&ball.id, Transition::Start)],
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

        let run_config = RunConfig {
            iteration_timeout: Some(Duration::from_secs(600)),
            ..config("s", 3)
        };
        let result = orchestrator.run(&run_config, |_| {}).expect("run");
        assert_eq!(
            result.stop,
            RunStop::TimedOut {
                message: "agent exceeded 600s".to_string()
            }
        );
        assert_eq!(result.iterations, 1);
        assert_eq!(
            project.store().get(&ball.id).expect("ball").state,
            BallState::InProgress
        );
    }

    #[test]
    fn blocked_with_progress_stops_blocked() {
        let project = TestProject::new().expect("project");
        let session = project.create_session("s").expect("session");
        project
            .store()
            .create_in_session(&session, NewBall::new("Work", Priority::High))
            .expect("ball");

        let runner = ScriptedRunner::new(
            project.root(),
            vec![ScriptedTurn::blocked("need credentials").with_progress("tried login")],
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

        let result = orchestrator.run(&config("s", 3), |_| {}).expect("run");
        assert_eq!(
            result.stop,
            RunStop::Blocked {
                reason: "need credentials".to_string()
            }
        );
        assert!(result.blocked());
    }

    #[test]
    fn unbacked_blocked_signal_is_ignored() {
        let project = TestProject::new().expect("project");
        let session = project.create_session("s").expect("session");
        project
            .store()
            .create_in_session(&session, NewBall::new("Work", Priority::High))
            .expect("ball");

        let runner = ScriptedRunner::new(
            project.root(),
            vec![ScriptedTurn::blocked("stuck"), ScriptedTurn::silent()],
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

        let mut warnings = Vec::new();
        let run_config = RunConfig {
            iteration_delay: Duration::from_secs(2),
            ..config("s", 2)
        };
        let result = orchestrator
            .run(&run_config, |event| {
                if let LoopEvent::Warning(message) = event {
                    warnings.push(message.clone());
                }
            })
            .expect("run");

        assert_eq!(result.stop, RunStop::MaxIterationsReached);
        assert_eq!(result.iterations, 2);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("signaled blocked but no progress"));
        // Delay only between iterations, not after the last one.
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(2)]);
        let log = project.progress().tail("s", 50).expect("tail");
        assert!(log.iter().any(|line| line.contains("warning: iteration 1")));
    }

    #[test]
    fn premature_complete_keeps_iterating() {
        let project = TestProject::new().expect("project");
        let session = project.create_session("s").expect("session");
        let a = project
            .store()
            .create_in_session(&session, NewBall::new("A", Priority::High))
            .expect("a");
        project
            .store()
            .create_in_session(&session, NewBall::new("B", Priority::High))
            .expect("b");

        let runner = ScriptedRunner::new(
            project.root(),
            vec![ScriptedTurn::complete()
                .with_progress("did A")
                .with_transition(&a.id, Transition::Start)
                .with_transition(&a.id, Transition::Complete)],
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

        let mut warnings = Vec::new();
        let result = orchestrator
            .run(&config("s", 1), |event| {
                if let LoopEvent::Warning(message) = event {
                    warnings.push(message.clone());
                }
            })
            .expect("run");
        assert_eq!(result.stop, RunStop::MaxIterationsReached);
        assert!(warnings[0].contains("work is incomplete (1/2 terminal)"));
    }

    #[test]
    fn runner_error_is_runner_failure_and_releases_lock() {
        let project = TestProject::new().expect("project");
        project.create_session("s").expect("session");

        let runner = ScriptedRunner::new(project.root(), Vec::new());
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

        let err = orchestrator.run(&config("s", 1), |_| {}).unwrap_err();
        assert!(matches!(
            find_juggle_error(&err),
            Some(JuggleError::RunnerFailure(_))
        ));
        SessionLock::acquire(&project.paths().session("s").lock_path, "s")
            .expect("lock released");
    }

    #[test]
    fn missing_session_fails_before_running() {
        let project = TestProject::new().expect("project");
        let runner = ScriptedRunner::new(project.root(), Vec::new());
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

        let err = orchestrator.run(&config("ghost", 1), |_| {}).unwrap_err();
        assert_eq!(
            find_juggle_error(&err),
            Some(&JuggleError::session_not_found("ghost"))
        );
        assert_eq!(prompts.calls(), 0);
    }

    #[test]
    fn filter_targets_one_ball_and_its_workdir() {
        let project = TestProject::new().expect("project");
        let session = project.create_session("s").expect("session");
        let workdir = project.root().join("sub");
        let a = project
            .store()
            .create_in_session(
                &session,
                NewBall {
                    working_dir: Some(workdir.clone()),
                    ..NewBall::new("A", Priority::High)
                },
            )
            .expect("a");
        project
            .store()
            .create_in_session(&session, NewBall::new("B", Priority::High))
            .expect("b");

        let runner = ScriptedRunner::new(
            project.root(),
            vec![ScriptedTurn::complete()
                .with_progress("done A")
                .with_transition(&a.id, Transition::Start)
                .with_transition(&a.id, Transition::Complete)],
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

        let run_config = RunConfig {
            ball_filter: Some(a.id[..a.id.len() - 2].to_string()),
            ..config("s", 3)
        };
        let result = orchestrator.run(&run_config, |_| {}).expect("run");
        assert_eq!(result.stop, RunStop::Complete);
        assert_eq!(result.ball_filter.as_deref(), Some(a.id.as_str()));
        assert_eq!(result.counts.total, 1);
        assert_eq!(runner.requests()[0].workdir, workdir);
    }
}
