// 10.0: fund engine. owns the event channel, the portfolio ledgers, the strategies and
// the execution handler, and drives one tick at a time to quiescence.
// single-threaded: fills from a live broker are polled onto the channel, never applied
// from the notifying thread.

mod core;
mod dispatch;
mod market;
mod results;

pub use core::{Engine, EngineSnapshot};
pub use results::{EngineError, RejectedOrder, TickReport};
