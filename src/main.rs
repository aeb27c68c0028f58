use anyhow::Context;
use procscope::cli::{Cli, Command, FindArgs};
use procscope::{
    ControlResult, ProcessController, ProcessRecord, ProcessService, ProcscopeError, ReturnCode,
    Snapshot,
};
use std::io::Write;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const STDOUT_ERROR: &str = "failed to write to stdout";

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let args = Cli::parse_args();
    init_logging(&args);

    if let Err(e) = args.validate() {
        eprintln!("procscope: {}", e);
        eprintln!("Use \"procscope --help\" to get help");
        return e.exit_code();
    }

    match execute(&args) {
        Ok(code) => code.as_exit_code(),
        Err(e) => {
            eprintln!("procscope: {:#}", e);
            e.downcast_ref::<ProcscopeError>()
                .map(ProcscopeError::to_return_code)
                .unwrap_or(ReturnCode::RuntimeError)
                .as_exit_code()
        }
    }
}

/// `RUST_LOG` wins over `-v`
fn init_logging(args: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("procscope={}", args.log_filter())));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn execute(args: &Cli) -> anyhow::Result<ReturnCode> {
    match &args.command {
        Command::Stop { pid } => report(args, ProcessController::system().stop(pid)),
        Command::Kill { pid } => report(args, ProcessController::system().kill(pid)),
        Command::Renice { pid, .. } => {
            let priority = args
                .priority()?
                .ok_or_else(|| ProcscopeError::InvalidArguments("missing priority".to_string()))?;
            let result = ProcessController::system().set_priority(pid, priority);
            report(args, result)
        }
        Command::List => {
            let snapshot = take_snapshot(args)?;
            print_records(args, snapshot.iter().filter(|r| !r.is_placeholder()))?;
            Ok(ReturnCode::NoError)
        }
        Command::Tree => {
            let snapshot = take_snapshot(args)?;
            if args.json {
                print_json(&snapshot)?;
            } else {
                print!("{}", snapshot.render_tree());
            }
            Ok(ReturnCode::NoError)
        }
        Command::Current => {
            let snapshot = take_snapshot(args)?;
            let record = snapshot.current_process()?;
            print_records(args, std::iter::once(record))?;
            Ok(ReturnCode::NoError)
        }
        Command::Info { pid } => {
            let service = ProcessService::system(args.snapshot_options()?);
            let extra = service.extra_info(pid)?;
            if args.json {
                print_json(&extra)?;
            } else {
                println!("{}", extra);
            }
            if extra.alive {
                Ok(ReturnCode::NoError)
            } else {
                Ok(ReturnCode::NotFound)
            }
        }
        Command::Find(find) => {
            let snapshot = take_snapshot(args)?;
            let matches = find_records(&snapshot, find);
            if matches.is_empty() {
                eprintln!("procscope: no process matches {}", find.describe());
                return Ok(ReturnCode::NotFound);
            }
            print_records(args, matches.into_iter())?;
            Ok(ReturnCode::NoError)
        }
    }
}

fn take_snapshot(args: &Cli) -> anyhow::Result<Snapshot> {
    let snapshot = ProcessService::system(args.snapshot_options()?).snapshot()?;
    for failure in snapshot.parse_failures() {
        debug!(%failure, "row skipped");
    }
    Ok(snapshot)
}

fn report(args: &Cli, result: ControlResult) -> anyhow::Result<ReturnCode> {
    debug!(%result, "control finished");
    if args.json {
        print_json(&result)?;
    }
    result.into_result()?;
    Ok(ReturnCode::NoError)
}

fn find_records<'a>(snapshot: &'a Snapshot, find: &'a FindArgs) -> Vec<&'a ProcessRecord> {
    if let Some(pid) = &find.pid {
        snapshot.by_pid(pid).into_iter().collect()
    } else if let Some(name) = &find.process_name {
        snapshot.by_name(name).collect()
    } else if let Some(user) = &find.user {
        snapshot.by_user(user).collect()
    } else if let Some(command) = &find.command {
        snapshot.by_command(command).collect()
    } else {
        Vec::new()
    }
}

fn print_records<'a>(
    args: &Cli,
    records: impl Iterator<Item = &'a ProcessRecord>,
) -> anyhow::Result<()> {
    if args.json {
        let records: Vec<&ProcessRecord> = records.collect();
        return print_json(&records);
    }
    let mut out = std::io::stdout().lock();
    for record in records {
        let line = record.summary();
        writeln!(out, "{}", line).context(STDOUT_ERROR)?;
    }
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)
        .context("failed to serialize output")?;
    writeln!(out).context(STDOUT_ERROR)?;
    Ok(())
}
