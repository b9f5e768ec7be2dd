pub mod aggregator;
pub mod client;
pub mod dispatch;
pub mod errors;
pub mod models;
pub mod normalize;
pub mod providers;
pub mod structured;
pub mod tool_schema;
