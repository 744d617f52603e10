use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use pcmsim::mem::cp_log::CpAnalysisLog;
use pcmsim::sim::config::SimConfig;
use pcmsim::sim::system::System;
use pcmsim::sim::trace::Trace;

#[derive(Parser)]
#[command(version, about)]
struct PcmSimArgs {
    /// Per-core trace files; one core per trace.
    #[arg(required = true)]
    traces: Vec<PathBuf>,

    /// Simulator configuration (key = value lines).
    #[arg(long)]
    config: PathBuf,

    /// Offline charge-pump analysis CSV; one file per controller.
    #[arg(long)]
    cp_analysis: Option<PathBuf>,

    /// Write `key = value` statistics here instead of stdout.
    #[arg(long)]
    stats_out: Option<PathBuf>,

    /// Also write the summary as pretty-printed JSON.
    #[arg(long)]
    json_summary: Option<PathBuf>,

    /// Retired instructions per execution phase; 0 disables phases.
    #[arg(long, default_value_t = 0)]
    instrs_per_phase: i64,

    /// Seed for page placement; same seed, same simulation.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Hard tick limit as a hang stop.
    #[arg(long, default_value_t = u64::MAX)]
    timeout: u64,
}

pub fn main() {
    env_logger::init();
    let args = PcmSimArgs::parse();
    if let Err(err) = run(args) {
        eprintln!("pcmsim: {err:#}");
        std::process::exit(1);
    }
}

fn run(args: PcmSimArgs) -> Result<()> {
    let cfg = SimConfig::from_file(&args.config)?;

    let mut traces = Vec::new();
    for (core_id, path) in args.traces.iter().enumerate() {
        info!("core {core_id} is assigned trace {}", path.display());
        traces.push(Trace::from_file(path)?);
    }

    let mut system = System::new(cfg, traces, args.seed);
    if args.instrs_per_phase > 0 {
        system.set_instrs_per_phase(args.instrs_per_phase);
    }
    if let Some(base) = &args.cp_analysis {
        for ctrl in system.mem.controllers.iter_mut() {
            ctrl.set_cp_log(CpAnalysisLog::create(&per_channel_path(base, ctrl.id()))?);
        }
    }

    let ticks = system.run(args.timeout);
    info!("simulation finished at tick {ticks}");

    let summary = system.summary();
    match &args.stats_out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create stats file {}", path.display()))?;
            summary.write_kv(&mut BufWriter::new(file))?;
        }
        None => {
            let stdout = std::io::stdout();
            summary.write_kv(&mut stdout.lock())?;
        }
    }
    if let Some(path) = &args.json_summary {
        let payload = serde_json::to_string_pretty(&summary)?;
        fs::write(path, payload)
            .with_context(|| format!("cannot write JSON summary {}", path.display()))?;
    }
    Ok(())
}

/// `pumps.csv` becomes `pumps_ch2.csv` for channel 2.
fn per_channel_path(base: &Path, channel: usize) -> PathBuf {
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("cp");
    let name = match base.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{stem}_ch{channel}.{ext}"),
        None => format!("{stem}_ch{channel}"),
    };
    base.with_file_name(name)
}
