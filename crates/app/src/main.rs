use std::fmt;
use std::sync::Arc;

use authority::{HttpAuthority, HttpAuthorityConfig, InMemoryAuthority, RemoteAuthority};
use services::sessions::spawn;
use services::{ControllerConfig, ControllerError, ExamCatalogService, ResultsService, SessionCommand};
use simulado_core::fixtures::sample_exam;
use simulado_core::model::{ChoiceId, ExamId, ItemId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod console;

use console::ConsoleObserver;

const DEMO_ITEMS: usize = 5;
const DEMO_MINUTES: u16 = 10;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidExamId { raw: String },
    MissingAuthority,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidExamId { raw } => write!(f, "invalid --exam value: {raw:?}"),
            ArgsError::MissingAuthority => {
                write!(f, "no authority configured; pass --authority <url> or --demo")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Demo,
    Http(String),
}

#[derive(Debug)]
struct Args {
    source: Source,
    exam: Option<ExamId>,
}

impl Args {
    fn parse(
        args: &mut impl Iterator<Item = String>,
        env_url: Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut source = env_url.map(Source::Http);
        let mut exam = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--authority" => source = Some(Source::Http(require_value(args, "--authority")?)),
                "--demo" => source = Some(Source::Demo),
                "--exam" => {
                    let value = require_value(args, "--exam")?;
                    let parsed = value
                        .parse::<ExamId>()
                        .map_err(|_| ArgsError::InvalidExamId { raw: value.clone() })?;
                    exam = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let source = source.ok_or(ArgsError::MissingAuthority)?;
        Ok(Self { source, exam })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [--authority <url> | --demo] [--exam <exam_id>]");
    eprintln!();
    eprintln!("Without --exam the first exam listed by the authority is used.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SIMULADO_AUTHORITY_URL, SIMULADO_HTTP_TIMEOUT_MS,");
    eprintln!("  SIMULADO_TICK_MS, SIMULADO_REFRESH_RETRIES, RUST_LOG");
}

fn print_commands() {
    println!("commands: a <choice> | c (clear) | n | p | t (pause/resume) | f | r | q");
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Command(SessionCommand),
    Help,
    Quit,
}

fn parse_input(line: &str, current: Option<ItemId>) -> Result<Input, String> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(Input::Help);
    };
    let command = match word {
        "a" | "answer" => {
            let item = current.ok_or("no item on screen yet")?;
            let choice = words.next().ok_or("answer needs a choice, e.g. `a B`")?;
            SessionCommand::RecordAnswer {
                item,
                choice: Some(ChoiceId::new(choice.to_uppercase())),
            }
        }
        "c" | "clear" => SessionCommand::RecordAnswer {
            item: current.ok_or("no item on screen yet")?,
            choice: None,
        },
        "n" | "next" => SessionCommand::Advance,
        "p" | "prev" => SessionCommand::Retreat,
        "t" | "pause" | "resume" => SessionCommand::TogglePause,
        "f" | "finish" => SessionCommand::Finish,
        "r" | "refresh" => SessionCommand::Refresh,
        "q" | "quit" => return Ok(Input::Quit),
        "h" | "help" | "?" => return Ok(Input::Help),
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(Input::Command(command))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn build_authority(source: &Source) -> Result<Arc<dyn RemoteAuthority>, Box<dyn std::error::Error>> {
    match source {
        Source::Demo => {
            let mut exam = sample_exam(DEMO_ITEMS);
            exam.duration_minutes = DEMO_MINUTES;
            Ok(Arc::new(InMemoryAuthority::default().with_exam(exam)))
        }
        Source::Http(raw) => {
            let mut config = HttpAuthorityConfig::parse(raw)?;
            if let Ok(env_config) = HttpAuthorityConfig::from_env() {
                config = config.with_timeout(env_config.timeout);
            }
            Ok(Arc::new(HttpAuthority::new(config)?))
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let env_url = std::env::var("SIMULADO_AUTHORITY_URL").ok();
    let args = Args::parse(&mut argv, env_url).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_tracing();

    let authority = build_authority(&args.source)?;
    let catalog =
        ExamCatalogService::new(Arc::clone(&authority)).with_config(ControllerConfig::from_env());

    let exam_id = match args.exam {
        Some(id) => id,
        None => catalog
            .list_exams()
            .await?
            .into_iter()
            .next()
            .ok_or("the authority lists no exams")?,
    };
    let exam = catalog.load_exam(&exam_id).await?;
    println!("{} - {} items", exam.display_name(), exam.len());
    print_commands();

    let console = Arc::new(ConsoleObserver::new(Arc::clone(&exam)));
    let controller = catalog.start_session(&exam_id, console.clone()).await?;
    let session_id = controller.session_id();
    info!(session_id = %session_id, exam_id = %exam_id, "session ready");

    let handle = spawn(controller);
    let finished = console.finished();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            () = finished.notified() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(&line, console.current_item()) {
                    Ok(Input::Quit) => break,
                    Ok(Input::Help) => print_commands(),
                    Ok(Input::Command(command)) => {
                        if let Err(err) = handle.submit(command) {
                            println!("! {err}");
                        }
                    }
                    Err(message) => println!("! {message}"),
                }
            }
        }
    }
    handle.dispose();

    match ResultsService::new(authority).fetch(session_id).await {
        Ok(results) => {
            println!(
                "score: {}/{} ({:.1}%)",
                results.correct_count, results.total_items, results.score_percent
            );
            for item in &results.per_item {
                let chosen = item
                    .user_choice
                    .as_ref()
                    .map_or_else(|| "-".to_string(), ToString::to_string);
                let mark = if item.is_correct { "ok" } else { "x" };
                println!(
                    "  {:>3}. {chosen} (key {}) {mark}",
                    item.ordinal, item.correct_choice
                );
            }
        }
        Err(ControllerError::NotReady) => println!("session {session_id} left unfinished"),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
