pub mod progress;

pub use progress::{
    estimate_remaining, ChannelObserver, ProgressObserver, ProgressReporter, ProgressSnapshot,
    SymbolFailure, SymbolOutcome, TracingObserver,
};
