use crate::sim::config::SimConfig;
use crate::tick::Addr;

/// Physical address fields, listed low-to-high. The least-significant
/// `log2(block_size)` bits are the cache-line offset; channel interleaving
/// sits directly above it so consecutive lines spread across channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    CacheLine,
    Channel,
    Bank,
    Partition,
    Col,
    Row,
    Rank,
}

pub const NUM_LEVELS: usize = 7;

pub type AddrVec = [u64; NUM_LEVELS];

/// Splits a physical address into the `Level` fields, with widths derived
/// from the configured topology.
#[derive(Debug, Clone)]
pub struct AddrDecoder {
    widths: [u32; NUM_LEVELS],
}

impl AddrDecoder {
    pub fn new(cfg: &SimConfig) -> Self {
        let bytes_per_row = cfg.num_of_bit_lines_per_tile / 8 * cfg.num_of_tiles;
        let cols = bytes_per_row / cfg.block_size;
        assert!(
            cols.is_power_of_two(),
            "blocks per row must be a power of two, got {cols}"
        );

        let mut widths = [0u32; NUM_LEVELS];
        widths[Level::CacheLine as usize] = log2(cfg.block_size);
        widths[Level::Channel as usize] = log2(cfg.num_of_channels);
        widths[Level::Bank as usize] = log2(cfg.num_of_banks);
        widths[Level::Partition as usize] = log2(cfg.num_of_parts);
        widths[Level::Col as usize] = log2(cols);
        widths[Level::Row as usize] = log2(cfg.num_of_word_lines_per_tile);
        widths[Level::Rank as usize] = log2(cfg.num_of_ranks);
        Self { widths }
    }

    pub fn decode(&self, addr: Addr) -> AddrVec {
        let mut vec = [0u64; NUM_LEVELS];
        let mut rest = addr;
        for (field, &width) in vec.iter_mut().zip(self.widths.iter()) {
            *field = rest & ((1u64 << width) - 1);
            rest >>= width;
        }
        vec
    }

    pub fn width(&self, level: Level) -> u32 {
        self.widths[level as usize]
    }
}

fn log2(v: u64) -> u32 {
    debug_assert!(v.is_power_of_two());
    v.trailing_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> AddrDecoder {
        let mut cfg = SimConfig::default();
        cfg.num_of_channels = 2;
        cfg.num_of_banks = 8;
        cfg.num_of_ranks = 2;
        AddrDecoder::new(&cfg)
    }

    #[test]
    fn low_bits_are_the_line_offset() {
        let d = decoder();
        let vec = d.decode(0x3F);
        assert_eq!(vec[Level::CacheLine as usize], 0x3F);
        assert_eq!(vec[Level::Channel as usize], 0);
    }

    #[test]
    fn channel_sits_above_the_line_offset() {
        let d = decoder();
        let vec = d.decode(64);
        assert_eq!(vec[Level::CacheLine as usize], 0);
        assert_eq!(vec[Level::Channel as usize], 1);
        assert_eq!(vec[Level::Bank as usize], 0);
    }

    #[test]
    fn bank_field_follows_channel() {
        let d = decoder();
        // 64B line, 2 channels: bank bits start at 1 << 7.
        let vec = d.decode(3 << 7);
        assert_eq!(vec[Level::Bank as usize], 3);
    }

    #[test]
    fn consecutive_lines_interleave_channels() {
        let d = decoder();
        let a = d.decode(0);
        let b = d.decode(64);
        let c = d.decode(128);
        assert_eq!(a[Level::Channel as usize], 0);
        assert_eq!(b[Level::Channel as usize], 1);
        assert_eq!(c[Level::Channel as usize], 0);
    }

    #[test]
    fn fields_reassemble_to_the_address() {
        let d = decoder();
        let addr = 0x1234_5678;
        let vec = d.decode(addr);
        let mut rebuilt = 0u64;
        let mut shift = 0u32;
        for (i, &field) in vec.iter().enumerate() {
            rebuilt |= field << shift;
            shift += d.widths[i];
        }
        assert_eq!(rebuilt, addr & ((1u64 << shift) - 1));
    }
}
