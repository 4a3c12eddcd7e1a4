//! `zmod-demo`: the ZMOD DAC 1411 demo programs, run against [`SimDac`].
//!
//! Set `RUST_LOG=debug` to see register writes and per-cycle progress.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dac_platform::{BoardConfig, ChannelId, FrequencyDivider, Gain};
use simulator::SimDac;
use tracing_subscriber::EnvFilter;
use waveform::period::period_from_frequency;
use waveform::{
    ChannelConfig, ModulatedSpec, PeriodMatcher, RampPlan, RampSpec, StreamController,
    StreamLimits, StreamReport, Waveform,
};

#[derive(Parser)]
#[command(name = "zmod-demo")]
#[command(about = "ZMOD DAC 1411 waveform demos against a simulated converter", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    sim: SimArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SimArgs {
    /// Board preset the simulated converter models
    #[arg(long, value_enum, default_value_t = Board::Linux, global = true)]
    board: Board,
    /// Samples the simulated DMA engine moves per completion poll
    #[arg(long, default_value_t = simulator::DEFAULT_SAMPLES_PER_POLL, global = true)]
    samples_per_poll: u64,
    /// Consecutive idle polls before a channel is declared stalled
    #[arg(long, default_value_t = StreamLimits::default().max_idle_polls, global = true)]
    max_idle_polls: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Fixed-length triangle ramp on one channel
    Ramp {
        #[command(flatten)]
        ramp: RampArgs,
        /// Samples per ramp period (multiple of 4)
        #[arg(long, default_value_t = 16)]
        length: usize,
    },
    /// Ramp sized from a voltage step, capped to one DMA transfer
    RampStep {
        #[command(flatten)]
        ramp: RampArgs,
        /// Volts per sample
        #[arg(long, default_value_t = 0.01)]
        step: f64,
    },
    /// Independent ramps on both channels
    Dual {
        /// Samples per ramp period on CH1
        #[arg(long, default_value_t = 1024)]
        length_ch1: usize,
        /// Samples per ramp period on CH2
        #[arg(long, default_value_t = 512)]
        length_ch2: usize,
        /// Centre level in volts
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        offset: f64,
        /// Peak deviation in volts
        #[arg(long, default_value_t = 1.0)]
        amplitude: f64,
        /// Output gain range
        #[arg(long, value_enum, default_value_t = GainArg::High)]
        gain: GainArg,
        /// Sample clock divider
        #[arg(long, default_value_t = 0)]
        divider: u8,
        /// Buffer replays per channel
        #[arg(long, default_value_t = 100)]
        cycles: u32,
    },
    /// Product of up to four period-matched sinusoids
    Multitone {
        /// Tone frequency in Hz (repeat for each tone)
        #[arg(long = "tone-hz", required = true)]
        tones_hz: Vec<f64>,
        /// Peak level in volts
        #[arg(long, default_value_t = 1.0)]
        amplitude: f64,
        /// How the shared buffer length is chosen
        #[arg(long, value_enum, default_value_t = Strategy::Tolerant)]
        strategy: Strategy,
        /// Relative period spread accepted by the tolerant strategy
        #[arg(long, default_value_t = 0.01)]
        tolerance: f64,
        /// Longest acceptable shared buffer in samples
        #[arg(long, default_value_t = dac_platform::buffer_limits::DEFAULT_MAX_SHARED_LENGTH)]
        max_length: u64,
        /// Output channel (1 or 2)
        #[arg(long, default_value_t = 1)]
        channel: u8,
        /// Output gain range
        #[arg(long, value_enum, default_value_t = GainArg::High)]
        gain: GainArg,
        /// Sample clock divider
        #[arg(long, default_value_t = 0)]
        divider: u8,
        /// Buffer replays
        #[arg(long, default_value_t = 10)]
        cycles: u32,
    },
}

#[derive(Args)]
struct RampArgs {
    /// Centre level in volts
    #[arg(long, default_value_t = 2.0, allow_hyphen_values = true)]
    offset: f64,
    /// Peak deviation in volts
    #[arg(long, default_value_t = 3.0)]
    amplitude: f64,
    /// Output gain range
    #[arg(long, value_enum, default_value_t = GainArg::High)]
    gain: GainArg,
    /// Sample clock divider
    #[arg(long, default_value_t = 2)]
    divider: u8,
    /// Buffer replays
    #[arg(long, default_value_t = 50)]
    cycles: u32,
    /// Output channel (1 or 2)
    #[arg(long, default_value_t = 1)]
    channel: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum Board {
    Linux,
    Baremetal,
}

impl From<Board> for BoardConfig {
    fn from(board: Board) -> Self {
        match board {
            Board::Linux => BoardConfig::zmod_dac1411_linux(),
            Board::Baremetal => BoardConfig::zmod_dac1411_baremetal(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum GainArg {
    Low,
    High,
}

impl From<GainArg> for Gain {
    fn from(gain: GainArg) -> Self {
        match gain {
            GainArg::Low => Gain::Low,
            GainArg::High => Gain::High,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Exact,
    Tolerant,
}

/// `--channel 1` is CH1, as printed on the board.
fn channel_arg(number: u8) -> Result<ChannelId> {
    let index = number
        .checked_sub(1)
        .with_context(|| format!("channel {number} does not exist, use 1 or 2"))?;
    ChannelId::try_new(index).with_context(|| format!("channel {number} does not exist, use 1 or 2"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let board = BoardConfig::from(cli.sim.board);
    let dac = SimDac::new(board).with_samples_per_poll(cli.sim.samples_per_poll);
    let limits = StreamLimits {
        max_idle_polls: cli.sim.max_idle_polls,
    };
    let mut ctl = StreamController::with_limits(dac, limits);

    match cli.command {
        Commands::Ramp { ramp, length } => {
            let waveform = Waveform::Ramp(RampSpec {
                offset: ramp.offset,
                amplitude: ramp.amplitude,
                length,
            });
            ctl.configure(ramp.channel_config(waveform)?)
                .context("configuring ramp")?;
        }
        Commands::RampStep { ramp, step } => {
            let plan = RampPlan::from_step(ramp.offset, ramp.amplitude, step)
                .context("sizing ramp from step")?;
            tracing::info!(
                length = plan.waveform.required_length(),
                requested_step = step,
                step = plan.step,
                "ramp planned"
            );
            ctl.configure(ramp.channel_config(plan.waveform)?)
                .context("configuring ramp")?;
        }
        Commands::Dual {
            length_ch1,
            length_ch2,
            offset,
            amplitude,
            gain,
            divider,
            cycles,
        } => {
            for (channel, length) in [(ChannelId::CH1, length_ch1), (ChannelId::CH2, length_ch2)] {
                let waveform = Waveform::Ramp(RampSpec {
                    offset,
                    amplitude,
                    length,
                });
                let config = ChannelConfig::new(channel, waveform)
                    .with_gain(gain.into())
                    .with_divider(FrequencyDivider::new(divider))
                    .with_max_cycles(cycles);
                ctl.configure(config)
                    .with_context(|| format!("configuring {channel}"))?;
            }
        }
        Commands::Multitone {
            tones_hz,
            amplitude,
            strategy,
            tolerance,
            max_length,
            channel,
            gain,
            divider,
            cycles,
        } => {
            let divider = FrequencyDivider::new(divider);
            let rate = f64::from(divider.output_sample_rate_hz(board.base_sample_rate_hz));
            let periods = tones_hz
                .iter()
                .map(|&hz| period_from_frequency(hz, rate))
                .collect::<Result<Vec<_>, _>>()
                .context("converting tone frequencies to periods")?;

            let matcher = PeriodMatcher {
                max_length,
                tolerance,
                ..PeriodMatcher::default()
            };
            let matched = match strategy {
                Strategy::Exact => matcher.match_exact(&periods),
                Strategy::Tolerant => matcher.match_tolerant(&periods),
            }
            .context("matching tone periods")?;

            for (tone, hz) in matched.tones.iter().zip(&tones_hz) {
                tracing::info!(
                    requested_hz = hz,
                    actual_hz = tone.frequency_hz(rate),
                    repeats = tone.repeat_count,
                    error = tone.relative_error(),
                    "tone"
                );
            }
            tracing::info!(shared_length = matched.shared_length, "shared buffer length");

            let spec = ModulatedSpec::from_match(amplitude, &matched)
                .context("building modulated waveform")?;
            let config = ChannelConfig::new(channel_arg(channel)?, Waveform::Modulated(spec))
                .with_gain(gain.into())
                .with_divider(divider)
                .with_max_cycles(cycles);
            ctl.configure(config).context("configuring multi-tone")?;
        }
    }

    let report = ctl.run().context("streaming")?;
    summarize(&report, ctl.driver());

    if !report.all_complete() {
        bail!("not every channel completed its cycles");
    }
    Ok(())
}

impl RampArgs {
    fn channel_config(&self, waveform: Waveform) -> Result<ChannelConfig> {
        Ok(ChannelConfig::new(channel_arg(self.channel)?, waveform)
            .with_gain(self.gain.into())
            .with_divider(FrequencyDivider::new(self.divider))
            .with_max_cycles(self.cycles))
    }
}

fn summarize(report: &StreamReport<simulator::SimError>, dac: &SimDac) {
    for entry in &report.channels {
        let volts = dac.captured_volts(entry.channel);
        let (min, max) = volts
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        match &entry.failure {
            None => tracing::info!(
                channel = %entry.channel,
                cycles = entry.completed_cycles,
                max_cycles = entry.max_cycles,
                samples = dac.emitted_samples(entry.channel),
                rate_hz = dac.sample_rate_hz(entry.channel),
                min_volts = min,
                max_volts = max,
                "channel finished"
            ),
            Some(e) => tracing::error!(
                channel = %entry.channel,
                cycles = entry.completed_cycles,
                max_cycles = entry.max_cycles,
                error = %e,
                "channel failed"
            ),
        }
    }
}
