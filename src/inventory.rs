pub mod group;
pub mod host;
pub mod manager;
pub mod patterns;
pub mod utils;
pub mod yml;
