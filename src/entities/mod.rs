pub mod exercise;
pub mod plan;
pub mod workout;
pub mod workout_set;
