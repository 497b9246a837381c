pub mod ai;
pub mod context;
pub mod images;
pub mod pipeline;
pub mod sinks;
pub mod sources;
