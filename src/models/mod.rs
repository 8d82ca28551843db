pub mod chain;
pub mod logs;
pub mod scenario;
pub mod schedule;

pub use chain::*;
pub use logs::*;
pub use scenario::*;
pub use schedule::*;
