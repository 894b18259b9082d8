pub mod alarm;
pub mod blocking;
pub mod config;
pub mod routine;
pub mod selection;
