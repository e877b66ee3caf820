//! `juggle` command-line interface.
//!
//! Thin layer over the library: parses arguments, resolves ids, and prints
//! results. Exit codes are defined in [`juggle::exit_codes`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use juggle::core::aggregate::aggregate;
use juggle::core::ball::{Ball, BallState, ModelSize, Priority, Transition};
use juggle::core::short_id::compute_minimal_unique_ids;
use juggle::core::types::{AgentMode, PermissionLevel};
use juggle::exit_codes;
use juggle::io::agent::ClaudeRunner;
use juggle::io::config::load_config;
use juggle::io::init::{InitOptions, JugglePaths, init_project};
use juggle::io::progress_log::FileProgressLog;
use juggle::io::prompt::{TemplatePromptGenerator, prompt_order};
use juggle::io::session::SessionStore;
use juggle::io::store::{BallStore, NewBall};
use juggle::orchestrator::{LoopEvent, Orchestrator, RunConfig, ThreadSleeper};

#[derive(Parser)]
#[command(
    name = "juggle",
    version,
    about = "Run an AI coding agent over a session of tasks until they are done"
)]
struct Cli {
    /// Project root containing `.juggle/`.
    #[arg(short = 'C', long, global = true, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.juggle/` scaffolding.
    Init {
        /// Rewrite the default config if `.juggle/` exists.
        #[arg(short, long)]
        force: bool,
    },
    /// Manage sessions.
    #[command(subcommand)]
    Session(SessionCommand),
    /// Create a ball.
    Add(AddArgs),
    /// List balls with their short ids.
    List {
        /// Only balls in this session.
        #[arg(short, long)]
        session: Option<String>,
        /// Include archived balls.
        #[arg(short, long)]
        all: bool,
    },
    /// Print a ball as JSON.
    Show { id: String },
    /// pending -> in_progress
    Start { id: String },
    /// in_progress -> blocked
    Block { id: String, reason: String },
    /// blocked -> in_progress
    Resume { id: String },
    /// in_progress -> complete (archives the ball)
    Complete { id: String },
    /// in_progress -> researched
    Research { id: String, output: String },
    /// Move a ball to the archive.
    Archive { id: String },
    /// Restore an archived ball as pending.
    Unarchive { id: String },
    /// Manage dependencies.
    #[command(subcommand)]
    Dep(DepCommand),
    /// Run the agent loop for a session.
    Run(RunArgs),
}

#[derive(Subcommand)]
enum SessionCommand {
    Create {
        id: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Notes included in every prompt.
        #[arg(long, default_value = "")]
        context: String,
        /// Default model size for new balls.
        #[arg(long)]
        model: Option<ModelSize>,
        /// Acceptance criterion inherited by new balls (repeatable).
        #[arg(long = "ac")]
        acceptance_criteria: Vec<String>,
    },
    List,
    Show {
        id: String,
    },
}

#[derive(Args)]
struct AddArgs {
    title: String,
    #[arg(short, long, default_value = "medium")]
    priority: Priority,
    /// Session to add the ball to (inherits its defaults).
    #[arg(short, long)]
    session: Option<String>,
    /// Acceptance criterion (repeatable). Overrides session criteria.
    #[arg(long = "ac")]
    acceptance_criteria: Vec<String>,
    #[arg(short, long = "tag")]
    tags: Vec<String>,
    /// Ball id or prefix this ball depends on (repeatable).
    #[arg(short, long = "depends-on")]
    depends_on: Vec<String>,
    #[arg(long)]
    model: Option<ModelSize>,
    /// Working directory for the agent. Defaults to the project root.
    #[arg(long)]
    dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum DepCommand {
    Add { id: String, dep: String },
    Rm { id: String, dep: String },
    /// Replace all dependencies (none clears them).
    Set { id: String, deps: Vec<String> },
}

#[derive(Args)]
struct RunArgs {
    session: String,
    /// Target a single ball (id or prefix) within the session.
    #[arg(short, long)]
    ball: Option<String>,
    #[arg(short = 'n', long)]
    max_iterations: Option<u32>,
    /// Per-iteration timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
    /// Delay between iterations in seconds.
    #[arg(long)]
    delay: Option<u64>,
    /// Total rate-limit wait budget in seconds.
    #[arg(long)]
    max_wait: Option<u64>,
    #[arg(long, default_value = "standard")]
    permission: PermissionLevel,
    /// Attach the agent to this terminal instead of capturing output.
    #[arg(short, long)]
    interactive: bool,
    /// Echo agent output while it runs.
    #[arg(long)]
    echo: bool,
}

fn main() {
    juggle::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("juggle: {err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = cli.project.as_path();
    match cli.command {
        Command::Init { force } => {
            let paths = init_project(root, &InitOptions { force })?;
            println!("initialized {}", paths.juggle_dir.display());
            Ok(exit_codes::OK)
        }
        Command::Session(cmd) => cmd_session(root, cmd),
        Command::Add(args) => cmd_add(root, args),
        Command::List { session, all } => cmd_list(root, session.as_deref(), all),
        Command::Show { id } => {
            let ball = BallStore::open(root)?.resolve_any(&id)?;
            println!("{}", serde_json::to_string_pretty(&ball)?);
            Ok(exit_codes::OK)
        }
        Command::Start { id } => cmd_transition(root, &id, Transition::Start),
        Command::Block { id, reason } => cmd_transition(root, &id, Transition::Block(reason)),
        Command::Resume { id } => cmd_transition(root, &id, Transition::Resume),
        Command::Complete { id } => cmd_transition(root, &id, Transition::Complete),
        Command::Research { id, output } => {
            cmd_transition(root, &id, Transition::Research(output))
        }
        Command::Archive { id } => {
            let store = BallStore::open(root)?;
            let ball = store.resolve(&id)?;
            store.archive(&ball)?;
            println!("archived {}", ball.id);
            Ok(exit_codes::OK)
        }
        Command::Unarchive { id } => {
            let store = BallStore::open(root)?;
            let ball = store.resolve_any(&id)?;
            let ball = store.unarchive(&ball.id)?;
            println!("{} {}", ball.id, ball.state);
            Ok(exit_codes::OK)
        }
        Command::Dep(cmd) => cmd_dep(root, cmd),
        Command::Run(args) => cmd_run(root, args),
    }
}

fn cmd_session(root: &Path, cmd: SessionCommand) -> Result<i32> {
    let sessions = SessionStore::open(root);
    match cmd {
        SessionCommand::Create {
            id,
            description,
            context,
            model,
            acceptance_criteria,
        } => {
            sessions.create(&id, &description)?;
            sessions.update(&id, |session| {
                session.context = context;
                session.default_model = model;
                session.acceptance_criteria = acceptance_criteria;
            })?;
            println!("created session {id}");
        }
        SessionCommand::List => {
            let store = BallStore::open(root)?;
            for session in sessions.list()? {
                let balls = store.session_balls(&session.id)?;
                let counts = aggregate(&balls);
                println!(
                    "{}\t{}/{} terminal\t{}",
                    session.id, counts.terminal, counts.total, session.description
                );
            }
        }
        SessionCommand::Show { id } => {
            let session = sessions.load(&id)?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_add(root: &Path, args: AddArgs) -> Result<i32> {
    let store = BallStore::open(root)?;
    let depends_on = args
        .depends_on
        .iter()
        .map(|query| store.resolve_any(query).map(|ball| ball.id))
        .collect::<Result<Vec<_>>>()?;
    let new = NewBall {
        title: args.title,
        priority: args.priority,
        acceptance_criteria: (!args.acceptance_criteria.is_empty())
            .then_some(args.acceptance_criteria),
        tags: args.tags.into_iter().collect::<BTreeSet<_>>(),
        depends_on,
        model_size: args.model,
        working_dir: args.dir,
    };
    let ball = match args.session {
        Some(session_id) => {
            let session = SessionStore::open(root).load(&session_id)?;
            store.create_in_session(&session, new)?
        }
        None => store.create_with(new)?,
    };
    println!("{}", ball.id);
    Ok(exit_codes::OK)
}

fn cmd_list(root: &Path, session: Option<&str>, all: bool) -> Result<i32> {
    let store = BallStore::open(root)?;
    let mut balls: Vec<Ball> = match session {
        Some(id) => store.session_balls(id)?,
        None if all => store.load_all()?,
        None => store.load_active()?,
    };
    if !all {
        balls.retain(|ball| ball.state != BallState::Complete);
    }
    prompt_order(&mut balls);

    let ids: Vec<&str> = balls.iter().map(|ball| ball.id.as_str()).collect();
    let short = compute_minimal_unique_ids(&ids);
    for ball in &balls {
        let short_id = short.get(&ball.id).map_or(ball.id.as_str(), String::as_str);
        println!(
            "{short_id:<12} {:<11} {:<7} {}",
            ball.state.as_str(),
            ball.priority.as_str(),
            ball.title
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_transition(root: &Path, query: &str, transition: Transition) -> Result<i32> {
    let store = BallStore::open(root)?;
    let ball = store.resolve(query)?;
    let ball = store.transition(&ball.id, transition)?;
    println!("{} {}", ball.id, ball.state);
    Ok(exit_codes::OK)
}

fn cmd_dep(root: &Path, cmd: DepCommand) -> Result<i32> {
    let store = BallStore::open(root)?;
    let resolve = |query: &str| store.resolve_any(query).map(|ball| ball.id);
    let ball = match cmd {
        DepCommand::Add { id, dep } => store.add_dependency(&resolve(&id)?, &resolve(&dep)?)?,
        DepCommand::Rm { id, dep } => store.remove_dependency(&resolve(&id)?, &resolve(&dep)?)?,
        DepCommand::Set { id, deps } => {
            let deps = deps
                .iter()
                .map(|query| resolve(query))
                .collect::<Result<Vec<_>>>()?;
            store.set_dependencies(&resolve(&id)?, deps)?
        }
    };
    println!("{} depends on [{}]", ball.id, ball.depends_on.join(", "));
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path, args: RunArgs) -> Result<i32> {
    let paths = JugglePaths::new(root);
    let config = load_config(&paths.config_path)
        .with_context(|| format!("load {}", paths.config_path.display()))?;

    let mut run_config = RunConfig::from_config(&config, &args.session);
    run_config.ball_filter = args.ball;
    run_config.permission = args.permission;
    if args.interactive {
        run_config.mode = AgentMode::Interactive;
    }
    if let Some(max) = args.max_iterations {
        run_config.max_iterations = max;
    }
    if let Some(secs) = args.timeout {
        run_config.iteration_timeout = Some(Duration::from_secs(secs));
    }
    if let Some(secs) = args.delay {
        run_config.iteration_delay = Duration::from_secs(secs);
    }
    if let Some(secs) = args.max_wait {
        run_config.max_rate_limit_wait = Some(Duration::from_secs(secs));
    }

    let balls = BallStore::open(root)?;
    let sessions = SessionStore::open(root);
    let progress = FileProgressLog::new(root);
    let prompts = TemplatePromptGenerator::new(root, config.progress_tail_lines)?;
    let runner = ClaudeRunner::new(config.agent.command.clone()).with_echo(args.echo);
    let orchestrator = Orchestrator::new(
        &balls,
        &sessions,
        &runner,
        &prompts,
        &progress,
        &ThreadSleeper,
    );

    let result = orchestrator.run(&run_config, print_event)?;
    let counts = result.counts;
    match result.as_error() {
        Some(err) => eprintln!("juggle: {err}"),
        None => println!(
            "{} after {} iteration(s): {}/{} terminal ({} complete, {} researched, {} blocked)",
            result.stop.as_str(),
            result.iterations,
            counts.terminal,
            counts.total,
            counts.complete,
            counts.researched,
            counts.blocked
        ),
    }
    Ok(exit_codes::for_stop(&result.stop))
}

fn print_event(event: &LoopEvent) {
    match event {
        LoopEvent::IterationStarted {
            iteration,
            max_iterations,
        } => eprintln!("iteration {iteration}/{max_iterations}"),
        LoopEvent::IterationFinished {
            iteration,
            signal,
            advanced,
            counts,
        } => eprintln!(
            "iteration {iteration} finished: signal={signal:?} progress={advanced} terminal={}/{}",
            counts.terminal, counts.total
        ),
        LoopEvent::RateLimited {
            iteration,
            retry,
            wait,
        } => eprintln!(
            "iteration {iteration}: rate limited (retry {retry}), waiting {}s",
            wait.as_secs()
        ),
        LoopEvent::Countdown { remaining } => {
            eprintln!("  resuming in {}s", remaining.as_secs());
        }
        LoopEvent::Warning(message) => eprintln!("warning: {message}"),
    }
}
