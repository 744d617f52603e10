use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use log::warn;

use crate::tick::Tick;

/// Memory controller flavor selected by the `mem_controller_type` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    Fcfs,
    CpStatic,
    Laser1,
    Laser2,
}

impl ControllerKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "FCFS" => Ok(ControllerKind::Fcfs),
            "CP-Static" => Ok(ControllerKind::CpStatic),
            "LASER-1" => Ok(ControllerKind::Laser1),
            "LASER-2" => Ok(ControllerKind::Laser2),
            other => bail!("unknown mem_controller_type: {other}"),
        }
    }

    /// FCFS runs the same tick loop with the charge-pump machinery disabled.
    pub fn uses_pumps(self) -> bool {
        !matches!(self, ControllerKind::Fcfs)
    }

    pub fn name(self) -> &'static str {
        match self {
            ControllerKind::Fcfs => "FCFS",
            ControllerKind::CpStatic => "CP-Static",
            ControllerKind::Laser1 => "LASER-1",
            ControllerKind::Laser2 => "LASER-2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLevel {
    L1i,
    L1d,
    L2,
    L3,
    Edram,
}

pub const NUM_CACHE_LEVELS: usize = 5;

impl CacheLevel {
    fn from_key(token: &str) -> Option<Self> {
        match token {
            "l1i" => Some(CacheLevel::L1i),
            "l1d" => Some(CacheLevel::L1d),
            "l2" => Some(CacheLevel::L2),
            "l3" => Some(CacheLevel::L3),
            "edram" => Some(CacheLevel::Edram),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheInfo {
    pub assoc: u32,
    pub size: u64,
    pub num_mshrs: usize,
    pub num_wb_entries: usize,
    pub tag_latency: Tick,
}

impl Default for CacheInfo {
    fn default() -> Self {
        Self {
            assoc: 8,
            size: 32 * 1024,
            num_mshrs: 32,
            num_wb_entries: 32,
            tag_latency: 1,
        }
    }
}

/// Whole-simulator configuration, parsed from the plain-text key/value file.
/// One setting per line, `#` starts a comment, `=` between key and value is
/// optional.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub workload: String,

    pub on_chip_frequency: f64,
    pub off_chip_frequency: f64,

    pub block_size: u64,
    pub caches: [CacheInfo; NUM_CACHE_LEVELS],

    pub mem_controller_type: ControllerKind,

    pub power_limit_enabled: bool,
    pub rapl: f64,
    pub starv_free_enabled: bool,
    pub thb: i64,

    pub num_of_word_lines_per_tile: u64,
    pub num_of_bit_lines_per_tile: u64,
    pub num_of_tiles: u64,
    pub num_of_parts: u64,

    pub num_of_banks: u64,
    pub num_of_ranks: u64,
    pub num_of_channels: u64,

    pub t_rcd: Tick,
    pub t_data: Tick,
    pub t_wl: Tick,
    pub t_wr: Tick,
    pub t_cl: Tick,

    pub pj_bit_rd: f64,
    pub pj_bit_set: f64,
    pub pj_bit_reset: f64,

    pub queue_size: usize,
    pub wr_high_watermark: f64,
    pub wr_low_watermark: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            workload: "unknown".to_string(),
            on_chip_frequency: 4000.0,
            off_chip_frequency: 400.0,
            block_size: 64,
            caches: [CacheInfo::default(); NUM_CACHE_LEVELS],
            mem_controller_type: ControllerKind::Fcfs,
            power_limit_enabled: false,
            rapl: 0.0,
            starv_free_enabled: false,
            thb: -8,
            num_of_word_lines_per_tile: 512,
            num_of_bit_lines_per_tile: 2048,
            num_of_tiles: 128,
            num_of_parts: 8,
            num_of_banks: 8,
            num_of_ranks: 1,
            num_of_channels: 1,
            t_rcd: 10,
            t_data: 8,
            t_wl: 10,
            t_wr: 100,
            t_cl: 10,
            pj_bit_rd: 2.47,
            pj_bit_set: 81.2,
            pj_bit_reset: 13.5,
            queue_size: 64,
            wr_high_watermark: 0.8,
            wr_low_watermark: 0.2,
        }
    }
}

const REQUIRED_KEYS: &[&str] = &[
    "on_chip_frequency",
    "off_chip_frequency",
    "block_size",
    "mem_controller_type",
    "num_of_word_lines_per_tile",
    "num_of_bit_lines_per_tile",
    "num_of_tiles",
    "num_of_parts",
    "num_of_banks",
    "num_of_ranks",
    "num_of_channels",
    "tRCD",
    "tData",
    "tWL",
    "tWR",
    "tCL",
    "pj_bit_rd",
    "pj_bit_set",
    "pj_bit_reset",
];

impl SimConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot open config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut cfg = SimConfig::default();
        let mut seen: HashSet<String> = HashSet::new();

        for (lineno, raw) in text.lines().enumerate() {
            let line = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            };
            let mut tokens = line
                .split(|c: char| c == '=' || c.is_whitespace())
                .filter(|t| !t.is_empty());
            let key = match tokens.next() {
                Some(key) => key,
                None => continue,
            };
            let value = tokens.next().unwrap_or("");

            cfg.apply(key, value)
                .with_context(|| format!("line {}: {}", lineno + 1, raw.trim()))?;
            seen.insert(key.to_string());
        }

        for key in REQUIRED_KEYS {
            if !seen.contains(*key) {
                bail!("missing required config key: {key}");
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(rest) = key.strip_prefix("cache_") {
            return self.apply_cache(key, rest, value);
        }
        match key {
            "workload" => self.workload = value.to_string(),
            "on_chip_frequency" => self.on_chip_frequency = num(key, value)?,
            "off_chip_frequency" => self.off_chip_frequency = num(key, value)?,
            "block_size" => self.block_size = num(key, value)?,
            "mem_controller_type" => {
                self.mem_controller_type = ControllerKind::from_name(value)?;
            }
            "power_limit_enabled" => self.power_limit_enabled = flag(key, value)?,
            "RAPL" => self.rapl = num(key, value)?,
            "starv_free_enabled" => self.starv_free_enabled = flag(key, value)?,
            "THB" => self.thb = num(key, value)?,
            "num_of_word_lines_per_tile" => self.num_of_word_lines_per_tile = num(key, value)?,
            "num_of_bit_lines_per_tile" => self.num_of_bit_lines_per_tile = num(key, value)?,
            "num_of_tiles" => self.num_of_tiles = num(key, value)?,
            "num_of_parts" => self.num_of_parts = num(key, value)?,
            "num_of_banks" => self.num_of_banks = num(key, value)?,
            "num_of_ranks" => self.num_of_ranks = num(key, value)?,
            "num_of_channels" => self.num_of_channels = num(key, value)?,
            "tRCD" => self.t_rcd = num(key, value)?,
            "tData" => self.t_data = num(key, value)?,
            "tWL" => self.t_wl = num(key, value)?,
            "tWR" => self.t_wr = num(key, value)?,
            "tCL" => self.t_cl = num(key, value)?,
            "pj_bit_rd" => self.pj_bit_rd = num(key, value)?,
            "pj_bit_set" => self.pj_bit_set = num(key, value)?,
            "pj_bit_reset" => self.pj_bit_reset = num(key, value)?,
            "queue_size" => self.queue_size = num(key, value)?,
            "wr_high_watermark" => self.wr_high_watermark = num(key, value)?,
            "wr_low_watermark" => self.wr_low_watermark = num(key, value)?,
            other => warn!("ignoring unknown config key: {other}"),
        }
        Ok(())
    }

    fn apply_cache(&mut self, key: &str, rest: &str, value: &str) -> Result<()> {
        let mut parts = rest.splitn(2, '_');
        let level = parts
            .next()
            .and_then(CacheLevel::from_key)
            .ok_or_else(|| anyhow!("unknown cache level in key: {key}"))?;
        let field = parts.next().unwrap_or("");
        let info = &mut self.caches[level as usize];
        match field {
            "assoc" => info.assoc = num(key, value)?,
            "size" => info.size = num(key, value)?,
            "mshrs" => info.num_mshrs = num(key, value)?,
            "wb" => info.num_wb_entries = num(key, value)?,
            "tag_latency" => info.tag_latency = num(key, value)?,
            other => warn!("ignoring unknown cache config field: {other}"),
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("block_size", self.block_size),
            ("num_of_banks", self.num_of_banks),
            ("num_of_ranks", self.num_of_ranks),
            ("num_of_channels", self.num_of_channels),
            ("num_of_parts", self.num_of_parts),
            ("num_of_word_lines_per_tile", self.num_of_word_lines_per_tile),
            ("num_of_bit_lines_per_tile", self.num_of_bit_lines_per_tile),
            ("num_of_tiles", self.num_of_tiles),
        ] {
            if !v.is_power_of_two() {
                bail!("{name} must be a power of two, got {v}");
            }
        }
        if self.wr_low_watermark >= self.wr_high_watermark {
            bail!(
                "wr_low_watermark ({}) must be below wr_high_watermark ({})",
                self.wr_low_watermark,
                self.wr_high_watermark
            );
        }
        Ok(())
    }

    pub fn cache(&self, level: CacheLevel) -> &CacheInfo {
        &self.caches[level as usize]
    }

    pub fn single_read_latency(&self) -> Tick {
        self.t_rcd + self.t_cl + self.t_data
    }

    pub fn single_write_latency(&self) -> Tick {
        self.t_rcd + self.t_wl + self.t_data + self.t_wr
    }

    /// Data-bus occupancy per access, scaled by the on-chip/off-chip clock
    /// ratio.
    pub fn channel_delay(&self) -> Tick {
        let ratio = self.on_chip_frequency / self.off_chip_frequency;
        (self.t_data as f64 * ratio).ceil() as Tick
    }

    /// Back-logging threshold for critical reads; `THB` overrides the
    /// default when starvation freedom is enabled.
    pub fn back_logging_threshold(&self) -> i64 {
        if self.starv_free_enabled {
            self.thb
        } else {
            -8
        }
    }

    pub fn banks_per_channel(&self) -> usize {
        (self.num_of_ranks * self.num_of_banks) as usize
    }

    /// Total PCM capacity in bytes, across all channels.
    pub fn pcm_size_bytes(&self) -> u64 {
        let word_lines_per_bank = self.num_of_word_lines_per_tile * self.num_of_parts;
        let byte_lines_per_bank = self.num_of_bit_lines_per_tile / 8 * self.num_of_tiles;
        word_lines_per_bank
            * byte_lines_per_bank
            * self.num_of_banks
            * self.num_of_ranks
            * self.num_of_channels
    }
}

fn num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("malformed value for {key}: {value:?}"))
}

fn flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(anyhow!("malformed boolean for {key}: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "\
workload = test
on_chip_frequency = 4000
off_chip_frequency = 400
block_size = 64
mem_controller_type = LASER-2
num_of_word_lines_per_tile = 512
num_of_bit_lines_per_tile = 2048
num_of_tiles = 128
num_of_parts = 8
num_of_banks = 8
num_of_ranks = 2
num_of_channels = 1
tRCD = 10
tData = 8
tWL = 10
tWR = 100
tCL = 10
pj_bit_rd = 2.47
pj_bit_set = 81.2
pj_bit_reset = 13.5
";

    #[test]
    fn parses_full_config() {
        let cfg = SimConfig::parse(BASE).unwrap();
        assert_eq!(cfg.workload, "test");
        assert_eq!(cfg.mem_controller_type, ControllerKind::Laser2);
        assert_eq!(cfg.num_of_banks, 8);
        assert_eq!(cfg.single_read_latency(), 28);
        assert_eq!(cfg.single_write_latency(), 128);
        assert_eq!(cfg.channel_delay(), 80);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let text = format!("# leading comment\n\n{BASE}num_of_banks = 16 # trailing\n");
        let cfg = SimConfig::parse(&text).unwrap();
        assert_eq!(cfg.num_of_banks, 16);
    }

    #[test]
    fn missing_key_is_fatal() {
        let text = BASE.replace("tWR = 100\n", "");
        let err = SimConfig::parse(&text).unwrap_err();
        assert!(err.to_string().contains("tWR"), "{err}");
    }

    #[test]
    fn unknown_controller_type_is_fatal() {
        let text = BASE.replace("LASER-2", "LASER-3");
        assert!(SimConfig::parse(&text).is_err());
    }

    #[test]
    fn malformed_numeric_is_fatal() {
        let text = BASE.replace("tRCD = 10", "tRCD = ten");
        assert!(SimConfig::parse(&text).is_err());
    }

    #[test]
    fn cache_fields_are_per_level() {
        let text = format!("{BASE}cache_l1d_mshrs = 4\ncache_l1d_tag_latency = 3\n");
        let cfg = SimConfig::parse(&text).unwrap();
        assert_eq!(cfg.cache(CacheLevel::L1d).num_mshrs, 4);
        assert_eq!(cfg.cache(CacheLevel::L1d).tag_latency, 3);
        assert_eq!(cfg.cache(CacheLevel::L2).num_mshrs, 32);
    }

    #[test]
    fn thb_overrides_threshold_only_when_enabled() {
        let cfg = SimConfig::parse(BASE).unwrap();
        assert_eq!(cfg.back_logging_threshold(), -8);
        let text = format!("{BASE}starv_free_enabled = true\nTHB = -16\n");
        let cfg = SimConfig::parse(&text).unwrap();
        assert_eq!(cfg.back_logging_threshold(), -16);
    }

    #[test]
    fn non_power_of_two_topology_is_fatal() {
        let text = BASE.replace("num_of_banks = 8", "num_of_banks = 6");
        assert!(SimConfig::parse(&text).is_err());
    }
}
