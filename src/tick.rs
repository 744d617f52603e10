/*
Clock and address primitives shared by every component.

The simulator is fully synchronous: one global tick per outer loop iteration,
and every latency is expressed as a `next_free` timestamp in ticks. Nothing
sleeps and nothing blocks; components advance by returning from `tick`.
*/

pub type Tick = u64;
pub type Addr = u64;
