//! Taskloom operator CLI
//!
//! Exercises pools and timer queues from the command line: burst a pool
//! and report its peak concurrency, tick a periodic timer, or print the
//! effective runtime configuration.

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossbeam::channel;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use taskloom::{
    try_submit_simple, CallbackEnvironment, Completion, ExecuteFlags, LegacyQueue, MonotonicClock,
    RuntimeConfig, ThreadPool, TimerQueue,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskloom")]
#[command(about = "Thread-pool runtime operator tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Runtime configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a burst of callbacks to a pool and report peak concurrency
    Burst {
        /// Number of callbacks to submit
        #[arg(short = 'n', long, default_value_t = 100)]
        count: usize,
        /// Worker ceiling (defaults to the configured value, or the CPU count)
        #[arg(short, long)]
        max_workers: Option<usize>,
        /// How long each callback sleeps, in milliseconds
        #[arg(long, default_value_t = 10)]
        sleep_ms: u64,
    },

    /// Run a periodic timer and print when it fires
    Tick {
        /// Delay before the first invocation, in milliseconds
        #[arg(long, default_value_t = 10)]
        due_ms: u64,
        /// Period between invocations, in milliseconds
        #[arg(long, default_value_t = 50)]
        period_ms: u64,
        /// How long to keep the timer running, in milliseconds
        #[arg(long, default_value_t = 500)]
        run_ms: u64,
        /// Run the callback on the dispatcher thread
        #[arg(long)]
        inline: bool,
    },

    /// Print the effective runtime configuration
    Config,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RuntimeConfig> {
    let Some(path) = path else {
        return Ok(RuntimeConfig::default());
    };
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    RuntimeConfig::from_toml_str(&source).with_context(|| format!("parsing {}", path.display()))
}

fn burst(config: &RuntimeConfig, count: usize, max_workers: Option<usize>, sleep: Duration) -> anyhow::Result<()> {
    let max_workers = max_workers.unwrap_or_else(|| {
        if config.pool.max_workers == taskloom::config::DEFAULT_MAX_WORKERS {
            num_cpus::get()
        } else {
            config.pool.max_workers
        }
    });
    let pool = ThreadPool::new(config.pool.clone().with_max_workers(max_workers))?;
    let env = CallbackEnvironment::new().with_pool(&pool);

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = channel::unbounded();

    let start = Instant::now();
    for _ in 0..count {
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        let tx = tx.clone();
        try_submit_simple(&env, move |_| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(sleep);
            current.fetch_sub(1, Ordering::SeqCst);
            let _ = tx.send(());
        })?;
    }
    drop(tx);

    for _ in 0..count {
        rx.recv().context("callback channel closed early")?;
    }
    let elapsed = start.elapsed();
    let stats = pool.stats();

    println!("callbacks:        {}", count);
    println!("max workers:      {}", max_workers);
    println!("peak concurrency: {}", peak.load(Ordering::SeqCst));
    println!("workers now:      {}", stats.workers);
    println!("elapsed:          {:?}", elapsed);
    Ok(())
}

fn tick(config: &RuntimeConfig, due: Duration, period: Duration, run: Duration, inline: bool) -> anyhow::Result<()> {
    let queue = TimerQueue::with_parts(
        config.timer.clone(),
        LegacyQueue::new(config.legacy.clone()),
        Arc::new(MonotonicClock::new()),
    )?;

    let flags = if inline {
        ExecuteFlags::EXECUTE_IN_TIMER_THREAD
    } else {
        ExecuteFlags::DEFAULT
    };
    let start = Instant::now();
    let (tx, rx) = channel::unbounded();
    let timer = queue.create_timer(
        move || {
            let _ = tx.send(start.elapsed());
        },
        due,
        period,
        flags,
    )?;

    let deadline = start + run;
    let mut fired = 0usize;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match rx.recv_timeout(remaining) {
            Ok(at) => {
                fired += 1;
                println!("tick {:>3} at {:>8.1} ms", fired, at.as_secs_f64() * 1000.0);
            }
            Err(_) => break,
        }
    }

    queue.delete_timer(&timer, Completion::Wait)?;
    queue.delete(Completion::Wait)?;
    println!("{} invocations in {:?}", fired, run);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Burst {
            count,
            max_workers,
            sleep_ms,
        } => burst(&config, count, max_workers, Duration::from_millis(sleep_ms))?,

        Commands::Tick {
            due_ms,
            period_ms,
            run_ms,
            inline,
        } => tick(
            &config,
            Duration::from_millis(due_ms),
            Duration::from_millis(period_ms),
            Duration::from_millis(run_ms),
            inline,
        )?,

        Commands::Config => print!("{}", config.to_toml_string()?),
    }

    Ok(())
}
