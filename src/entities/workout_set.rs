use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: Uuid,
    pub workout_id: Uuid,
    #[serde(rename = "workoutExerciseId")]
    pub exercise_id: Uuid,
    pub set_number: u32,
    pub weight: f64,
    pub reps: u32,
    pub completed_at: DateTime<Utc>,
}
