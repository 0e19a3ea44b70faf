// Data models for the engagement engine

pub mod badge;
pub mod challenge;
pub mod daily_log;
pub mod daily_summary;
pub mod meal;
pub mod targets;

pub use badge::*;
pub use challenge::*;
pub use daily_log::*;
pub use daily_summary::*;
pub use meal::*;
pub use targets::*;
