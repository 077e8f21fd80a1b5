pub mod cancel;
pub mod context;
pub mod element;
pub mod rows;
pub mod scalar;

pub use cancel::CancellationToken;
pub use context::ExecutionContext;
pub use element::ElementExecutor;
pub use rows::{QueryExecutor, RowSequence};
pub use scalar::ScalarExecutor;
