//! Local relational store for a workout tracker: plans, exercises, workouts,
//! and logged sets kept as flat collections in an injected key-value storage
//! backend, with joins reconstructed in memory on every read.

pub mod entities;
pub mod error;
pub mod model;
pub mod storage;
pub mod store;

pub use error::StoreError;
pub use storage::{Collection, FileStorage, MemoryStorage, Storage};
pub use store::{PlanDetail, SetDetail, Store, WorkoutDetail};
