// src/services/mod.rs

pub mod leaderboard;
pub mod ranking;
pub mod recorder;
pub mod scoring;
