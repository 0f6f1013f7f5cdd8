//! Request handlers.

pub mod health;
pub mod maintenance;
pub mod models;
pub mod predict;
pub mod results;
pub mod transcode;

pub use health::*;
pub use maintenance::*;
pub use models::*;
pub use predict::*;
pub use results::*;
pub use transcode::*;
