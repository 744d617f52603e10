use crate::tick::Tick;

/// Availability model for one channel and its ranks/banks.
///
/// The original hierarchy (channel -> rank -> bank, each node carrying
/// `cur_clk`/`next_free` and a parent pointer) collapses to one clock, one
/// channel timestamp and a flat per-bank vector; the operations and
/// invariants are unchanged. A bank is free iff both its own `next_free`
/// and the channel's have passed.
#[derive(Debug, Clone)]
pub struct Array {
    num_banks: usize,
    cur_clk: Tick,
    channel_next_free: Tick,
    bank_next_free: Vec<Tick>,
}

impl Array {
    pub fn new(num_ranks: usize, num_banks: usize) -> Self {
        Self {
            num_banks,
            cur_clk: 0,
            channel_next_free: 0,
            bank_next_free: vec![0; num_ranks * num_banks],
        }
    }

    fn bank_index(&self, rank: usize, bank: usize) -> usize {
        debug_assert!(bank < self.num_banks);
        rank * self.num_banks + bank
    }

    /// Called exactly once per controller tick, before any scheduling
    /// decision. Idempotent for a repeated clock value.
    pub fn update(&mut self, clk: Tick) {
        debug_assert!(clk >= self.cur_clk, "clock moved backwards");
        self.cur_clk = clk;
    }

    pub fn cur_clk(&self) -> Tick {
        self.cur_clk
    }

    /// Both the bank and the channel have to be past their `next_free`.
    pub fn is_free(&self, rank: usize, bank: usize) -> bool {
        self.bank_next_free[self.bank_index(rank, bank)] <= self.cur_clk
            && self.channel_next_free <= self.cur_clk
    }

    /// Bank-only availability; lets the scheduler track fine-grained pump
    /// state independently of channel contention.
    pub fn is_bank_free(&self, rank: usize, bank: usize) -> bool {
        self.bank_next_free[self.bank_index(rank, bank)] <= self.cur_clk
    }

    pub fn post_access(
        &mut self,
        rank: usize,
        bank: usize,
        channel_latency: Tick,
        bank_latency: Tick,
    ) {
        assert!(
            self.is_free(rank, bank),
            "post_access on a busy bank ({rank}, {bank})"
        );
        self.channel_next_free = self.cur_clk + channel_latency;
        let idx = self.bank_index(rank, bank);
        self.bank_next_free[idx] = self.cur_clk + bank_latency;
    }

    /// Discharge-induced unavailability: occupies the bank without touching
    /// the channel.
    pub fn add_bank_latency(&mut self, rank: usize, bank: usize, dt: Tick) {
        let idx = self.bank_index(rank, bank);
        self.bank_next_free[idx] = self.cur_clk + dt;
    }

    pub fn re_initialize(&mut self) {
        self.cur_clk = 0;
        self.channel_next_free = 0;
        self.bank_next_free.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_array_is_free_everywhere() {
        let a = Array::new(2, 4);
        for rank in 0..2 {
            for bank in 0..4 {
                assert!(a.is_free(rank, bank));
                assert!(a.is_bank_free(rank, bank));
            }
        }
    }

    #[test]
    fn update_is_monotone_and_idempotent() {
        let mut a = Array::new(1, 2);
        a.update(5);
        assert_eq!(a.cur_clk(), 5);
        a.update(5); // no-op
        assert_eq!(a.cur_clk(), 5);
        a.update(9);
        assert_eq!(a.cur_clk(), 9);
    }

    #[test]
    fn post_access_occupies_bank_and_channel() {
        let mut a = Array::new(1, 2);
        a.update(1);
        a.post_access(0, 0, 2, 10);
        assert!(!a.is_free(0, 0));
        assert!(!a.is_bank_free(0, 0));
        // Other bank is blocked only through the channel.
        assert!(a.is_bank_free(0, 1));
        assert!(!a.is_free(0, 1));

        a.update(3);
        // Channel frees at 1 + 2.
        assert!(a.is_free(0, 1));
        assert!(!a.is_bank_free(0, 0));
        a.update(11);
        assert!(a.is_free(0, 0));
    }

    #[test]
    #[should_panic(expected = "post_access on a busy bank")]
    fn post_access_requires_a_free_bank() {
        let mut a = Array::new(1, 1);
        a.update(1);
        a.post_access(0, 0, 2, 10);
        a.post_access(0, 0, 2, 10);
    }

    #[test]
    fn add_bank_latency_leaves_channel_alone() {
        let mut a = Array::new(1, 2);
        a.update(4);
        a.add_bank_latency(0, 1, 7);
        assert!(!a.is_bank_free(0, 1));
        assert!(a.is_free(0, 0));
        a.update(11);
        assert!(a.is_bank_free(0, 1));
    }

    #[test]
    fn re_initialize_zeroes_everything() {
        let mut a = Array::new(1, 1);
        a.update(10);
        a.post_access(0, 0, 5, 5);
        a.re_initialize();
        assert_eq!(a.cur_clk(), 0);
        assert!(a.is_free(0, 0));
    }
}
