mod pool;

pub use pool::{TaskKind, TaskPool, TaskStatsSnapshot};
