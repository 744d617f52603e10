use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::tick::Tick;

/// One discharge event for the offline charge-pump analysis.
#[derive(Debug, Clone)]
pub struct CpEvent {
    /// "RCP", "WCP" or "Both".
    pub pump: &'static str,
    pub bank_uid: u64,
    pub begin_charge: Tick,
    pub end_charge: Tick,
    pub begin_discharge: Tick,
    pub end_discharge: Tick,
    pub idle_ticks: Tick,
    pub ps_aging: f64,
    pub vl_aging: f64,
    pub sa_aging: f64,
}

/// Buffered CSV sink for discharge events, one line per event.
pub struct CpAnalysisLog {
    out: BufWriter<File>,
}

impl CpAnalysisLog {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("cannot create charge-pump log {}", path.display()))?;
        let mut out = BufWriter::new(file);
        let _ = writeln!(
            out,
            "pump,bank_uid,begin_charge,end_charge,begin_discharge,end_discharge,\
             idle_ticks,ps_aging,vl_aging,sa_aging"
        );
        Ok(Self { out })
    }

    pub fn record(&mut self, ev: &CpEvent) {
        let _ = writeln!(
            self.out,
            "{},{},{},{},{},{},{},{},{},{}",
            ev.pump,
            ev.bank_uid,
            ev.begin_charge,
            ev.end_charge,
            ev.begin_discharge,
            ev.end_discharge,
            ev.idle_ticks,
            ev.ps_aging,
            ev.vl_aging,
            ev.sa_aging
        );
    }

    pub fn flush(&mut self) {
        let _ = self.out.flush();
    }
}

impl Drop for CpAnalysisLog {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn writes_header_and_records() {
        let path = std::env::temp_dir().join(format!("cp_log_test_{}.csv", std::process::id()));
        {
            let mut log = CpAnalysisLog::create(&path).unwrap();
            log.record(&CpEvent {
                pump: "WCP",
                bank_uid: 3,
                begin_charge: 10,
                end_charge: 12,
                begin_discharge: 40,
                end_discharge: 52,
                idle_ticks: 7,
                ps_aging: 580.95,
                vl_aging: 171.26,
                sa_aging: 5.22,
            });
        }
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("pump,bank_uid,begin_charge"));
        assert_eq!(lines.next().unwrap(), "WCP,3,10,12,40,52,7,580.95,171.26,5.22");
        fs::remove_file(&path).unwrap();
    }
}
