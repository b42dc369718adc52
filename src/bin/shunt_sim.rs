//! Runs the canary-rollout simulation and prints a downsampled trace.
//!
//! Output is whitespace-separated columns, one row per output bucket, with a
//! header row naming the columns.  Feed it straight to gnuplot or a
//! dataframe.

use std::time::Duration;

use clap::Parser;

use shunt::sim::{downsample, simulate, SimParams};
use shunt::ConfigError;

#[derive(Debug, Parser)]
#[command(name = "shunt-sim", about = "Simulate an epsilon-greedy canary rollout")]
struct Args {
    /// Step index at which the new implementation starts failing.
    #[arg(long, default_value_t = 500)]
    phase_shift: u64,

    /// Total number of simulated calls.
    #[arg(long, default_value_t = 1000)]
    steps: u64,

    /// RNG seed; identical seeds produce identical traces.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Exploration probability. Omit to use the router's default.
    #[arg(long)]
    epsilon: Option<f64>,

    /// Number of slots in the feedback window.
    #[arg(long, default_value_t = 6)]
    slots: usize,

    /// Duration of each window slot, in seconds.
    #[arg(long, default_value_t = 30.0)]
    slot_duration: f64,

    /// Simulated seconds between consecutive calls.
    #[arg(long, default_value_t = 1.0)]
    duration_per_step: f64,

    /// Output bucket width, in seconds.
    #[arg(long, default_value_t = 60.0)]
    output_resolution: f64,

    /// Phase-1 failure probability of the original implementation.
    #[arg(long, default_value_t = 0.0)]
    phase1_orig_impl_error_ratio: f64,

    /// Phase-1 failure probability of the new implementation.
    #[arg(long, default_value_t = 0.0)]
    phase1_new_impl_error_ratio: f64,

    /// Phase-2 failure probability of the original implementation.
    #[arg(long, default_value_t = 0.0)]
    phase2_orig_impl_error_ratio: f64,

    /// Phase-2 failure probability of the new implementation.
    #[arg(long, default_value_t = 1.0)]
    phase2_new_impl_error_ratio: f64,
}

fn seconds(value: f64) -> Result<Duration, ConfigError> {
    if value < 0.0 {
        return Err(ConfigError::NegativeDuration(value));
    }
    Ok(Duration::from_secs_f64(value))
}

fn params_from(args: &Args) -> Result<SimParams, ConfigError> {
    let mut params = SimParams {
        phase_shift: args.phase_shift,
        steps: args.steps,
        seed: args.seed,
        epsilon: args.epsilon,
        slots: args.slots,
        slot_duration: seconds(args.slot_duration)?,
        duration_per_step: seconds(args.duration_per_step)?,
        output_resolution: seconds(args.output_resolution)?,
        ..SimParams::default()
    };
    params.phase1.orig.error_ratio = args.phase1_orig_impl_error_ratio;
    params.phase1.new.error_ratio = args.phase1_new_impl_error_ratio;
    params.phase2.orig.error_ratio = args.phase2_orig_impl_error_ratio;
    params.phase2.new.error_ratio = args.phase2_new_impl_error_ratio;
    Ok(params)
}

fn main() -> Result<(), ConfigError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let params = params_from(&args)?;
    let samples = simulate(&params)?;

    println!(
        "ms oldImplCalls newImplCalls oldImplExceptions newImplExceptions \
         nPhase1Samples nPhase2Samples"
    );
    for (start, bucket) in downsample(&samples, params.output_resolution) {
        println!(
            "{} {} {} {} {} {} {}",
            start.as_millis(),
            bucket.old_impl_calls,
            bucket.new_impl_calls,
            bucket.old_impl_failures,
            bucket.new_impl_failures,
            bucket.phase1_samples,
            bucket.phase2_samples,
        );
    }
    Ok(())
}
