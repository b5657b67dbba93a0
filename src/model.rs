use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanInput {
    pub name: String,
    pub description: Option<String>,
    pub exercises: Vec<ExerciseInput>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExerciseInput {
    pub name: String,
    pub description: Option<String>,
    pub sets: u32,
    pub reps: u32,
    pub rest_time: u32,
    pub order: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlanChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExerciseChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sets: Option<u32>,
    pub reps: Option<u32>,
    pub rest_time: Option<u32>,
    pub order: Option<u32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkoutChanges {
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetInput {
    pub workout_id: Uuid,
    pub exercise_id: Uuid,
    pub set_number: u32,
    pub weight: f64,
    pub reps: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SetChanges {
    pub weight: Option<f64>,
    pub reps: Option<u32>,
}
