use anyhow::Context;
use clap::Parser;
use evwatch::cli::Cli;
use evwatch::discover::discover_scenarios;
use evwatch::output::Output;
use evwatch::runner::{FileResult, ProgressEvent, Runner};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    // Reset SIGPIPE handler to default (terminate) so piping to head/tail works correctly
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    let cli = Cli::parse();
    init_tracing(cli.log_level());

    let use_color = !cli.no_color && atty::is(atty::Stream::Stdout);
    let mut output = Output::new(use_color);

    let root = cli.path.canonicalize().unwrap_or(cli.path.clone());
    let files = discover_scenarios(&root)
        .with_context(|| format!("failed to discover scenarios in {}", root.display()))?;

    if files.is_empty() {
        eprintln!("No scenario files found");
        std::process::exit(1);
    }

    if cli.list {
        let runner = Runner::new(cli.run_config(cli.events.clone().unwrap_or_default()));
        list_cases(&runner, &files, &mut output);
        return Ok(());
    }

    let Some(events) = cli.events.clone() else {
        anyhow::bail!("no event stream given: pass --events or set EVWATCH_EVENTS");
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;

    let runner = Runner::new(cli.run_config(events)).with_cancel(cancel);

    let start_time = Instant::now();
    let (progress_tx, progress_rx) = mpsc::channel::<ProgressEvent>();
    let verbose = cli.verbose;
    let progress_handle = thread::spawn(move || {
        let mut output = Output::new(use_color);
        for event in progress_rx {
            output.print_progress(&event, verbose);
        }
        output.finish_progress();
    });

    let results: Vec<FileResult> = runner.run(&files, Some(&progress_tx));

    drop(progress_tx);
    if progress_handle.join().is_err() {
        anyhow::bail!("progress output thread panicked");
    }

    output.print_results(&results, start_time.elapsed());

    let all_passed = results.iter().all(FileResult::passed);
    std::process::exit(if all_passed { 0 } else { 1 });
}

fn list_cases(runner: &Runner, files: &[PathBuf], output: &mut Output) {
    let mut listed: Vec<(&Path, _)> = Vec::new();
    for file in files {
        match runner.load_file(file) {
            Ok(cases) => {
                let cases: Vec<_> = runner
                    .select_cases(file, cases)
                    .into_iter()
                    .map(|case| {
                        let problems = Runner::lint_case(&case);
                        (case, problems)
                    })
                    .collect();
                if !cases.is_empty() || runner.config().pattern.is_none() {
                    listed.push((file.as_path(), cases));
                }
            }
            Err(e) => output.print_error(file, &e.to_string()),
        }
    }
    output.print_list(&listed);
}
