#![forbid(unsafe_code)]

pub mod error;
pub mod gamification;
pub mod leaderboard;
pub mod model;
pub mod normalizer;
pub mod progression;
pub mod scoring;
pub mod time;

pub use time::Clock;
