use anyhow::Result;
use budgeteer::defs::Args;
use budgeteer::read::{read_manifest, Collector};
use budgeteer::session::Session;
use budgeteer::write::{dump_path, write_stats};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::{event, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

// stdin is read on a blocking thread that a runtime shutdown would wait on
// until end of input, so the process always leaves through `exit`.
#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_writer(std::io::stderr)
                .with_filter(LevelFilter::from_level(args.log_level.into())),
        )
        .init();

    let code = match run(&args).await {
        Ok(failed) if failed > 0 => 1,
        Ok(_) => 0,
        Err(e) => {
            event!(Level::ERROR, "{:#}", e);
            2
        }
    };
    std::io::stdout().flush().ok();
    std::process::exit(code);
}

/// Runs one session and returns the number of failed checks.
async fn run(args: &Args) -> Result<usize> {
    let manifest = read_manifest(&args.budgets)?;
    let mut session = Session::new(args.profile_mode);
    for test in manifest.tests {
        session.register_test(test.id(), test.checks);
    }

    let collector = match &args.samples {
        Some(path) => Collector::spawn(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Collector::spawn(BufReader::new(tokio::io::stdin())),
    };
    let limit = args.timeout.map(Duration::from_secs);
    session
        .collect(collector, limit, Duration::from_millis(args.grace_ms))
        .await?;
    let summary = session.freeze();

    let mut written: Option<PathBuf> = None;
    if let Some(dump) = &args.dump {
        if summary.accepted > 0 {
            let path = match dump {
                Some(path) => path.clone(),
                None => dump_path(&std::env::current_dir()?),
            };
            write_stats(session.stats()?, &path).await?;
            event!(Level::DEBUG, "wrote call tree to {}", path.display());
            written = Some(path);
        }
    }

    let report = session.check()?;
    print!("{}", report.render(written.as_deref())?);

    Ok(report.failed())
}
