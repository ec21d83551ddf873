use std::{
    num::{NonZeroU64, NonZeroUsize},
    path::PathBuf,
    process::ExitCode,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use clap::Parser;
use sealed_io::{Benchmark, BenchmarkResult, RunnerConfig};
use tracing::{error, info};

mod report;

#[derive(serde::Serialize, clap::Parser, Clone)]
struct Args {
    /// Payload sizes in MiB, one benchmark run each.
    #[clap(default_values = ["1", "10", "100", "1000"])]
    sizes_mib: Vec<NonZeroU64>,
    /// Directory for the scratch files. Must be on the device under test.
    #[clap(long, default_value = ".")]
    dir: PathBuf,
    /// Upper bound on concurrent workers per phase [default: SEALED_IO_WORKER_CAP or 8]
    #[clap(long)]
    worker_cap: Option<NonZeroUsize>,
    #[clap(long, value_enum, default_value = "direct")]
    io_mode: IoMode,
    #[clap(long, value_enum, default_value = "std")]
    engine: EngineKind,
    /// Skip comparing recovered plaintext against what was written.
    #[clap(long)]
    no_validate: bool,
    /// Write arguments and results as JSON to this file.
    #[clap(long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, clap::ValueEnum, serde::Serialize)]
enum IoMode {
    Direct,
    Cached,
}

#[derive(Clone, Copy, clap::ValueEnum, serde::Serialize)]
enum EngineKind {
    Std,
    TokioSpawnBlocking,
}

#[derive(serde::Serialize)]
struct BenchmarkOutput<'a> {
    args: &'a Args,
    results: &'a [BenchmarkResult],
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .with_env_filter({
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        })
        .init();

    sealed_io::env_tunables::assert_no_unknown_env_vars();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    let config = setup_config(args).map_err(|e| format!("invalid configuration: {e}"))?;
    if config.io_mode() == sealed_io::IoMode::Direct && !direct_io_common::probe_direct_io(&args.dir)
    {
        return Err(format!(
            "direct I/O is not supported in {:?}; pick another --dir or pass --io-mode cached",
            args.dir
        ));
    }
    info!(
        dir = ?config.dir(),
        block_size = config.block_size(),
        workers = config.worker_count(),
        io_mode = ?config.io_mode(),
        engine = ?config.engine(),
        "starting"
    );

    let stop = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let stop = Arc::clone(&stop);
        move || {
            info!("ctrl-c, setting stop flag");
            if stop.fetch_or(true, Ordering::Relaxed) {
                error!("stop flag was already set, aborting");
                std::process::abort();
            } else {
                info!("first ctrl-c, finishing the current size");
            }
        }
    })
    .map_err(|e| format!("cannot install ctrl-c handler: {e}"))?;

    let sizes = args
        .sizes_mib
        .iter()
        .map(|mib| {
            usize::try_from(mib.get())
                .ok()
                .and_then(|mib| mib.checked_mul(1 << 20))
                .ok_or_else(|| format!("size of {mib} MiB does not fit in memory"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let results = Benchmark::new(config)
        .map_err(|e| e.to_string())?
        .with_stop_flag(stop)
        .run(&sizes)
        .map_err(|e| format!("benchmark aborted: {e}"))?;

    println!("{}", report::table(&results));

    if let Some(outpath) = &args.output {
        let output = BenchmarkOutput {
            args,
            results: &results,
        };
        info!("writing results to {:?}", outpath);
        let json = serde_json::to_string(&output).map_err(|e| e.to_string())?;
        std::fs::write(outpath, json).map_err(|e| format!("cannot write {outpath:?}: {e}"))?;
    }
    Ok(())
}

fn setup_config(args: &Args) -> sealed_io::Result<RunnerConfig> {
    let mut config = RunnerConfig::new(&args.dir)?
        .with_io_mode(match args.io_mode {
            IoMode::Direct => sealed_io::IoMode::Direct,
            IoMode::Cached => sealed_io::IoMode::Cached,
        })
        .with_engine(match args.engine {
            EngineKind::Std => sealed_io::EngineKind::Std,
            EngineKind::TokioSpawnBlocking => sealed_io::EngineKind::TokioSpawnBlocking,
        })
        .with_validate(!args.no_validate);
    if let Some(cap) = args.worker_cap {
        config = config.with_worker_cap(cap.get())?;
    }
    Ok(config)
}
