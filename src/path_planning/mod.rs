// Path Planning algorithms module

pub mod rrtx;

pub use rrtx::*;
