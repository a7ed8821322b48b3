mod app;
mod args;
mod pacing;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::args::Args;

fn init_tracing(args: &Args) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gbsr_runtime={0},gbsr={0}", args.log_level)));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true);

    let guard = match &args.log_file {
        Some(path) => {
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty());
            let name = path.file_name().context("--log-file needs a file name")?;
            let appender = tracing_appender::rolling::never(dir.unwrap_or(".".as_ref()), name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let subscriber = builder.with_ansi(false).with_writer(writer).finish();
            tracing::subscriber::set_global_default(subscriber)?;
            Some(guard)
        }
        None => {
            let subscriber = builder.with_writer(std::io::stderr).finish();
            tracing::subscriber::set_global_default(subscriber)?;
            None
        }
    };
    Ok(guard)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_tracing(&args)?;
    app::run(args)
}
