use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::entities::{exercise, plan, workout, workout_set};
use crate::error::StoreError;
use crate::model::{
    ExerciseChanges, ExerciseInput, PlanChanges, PlanInput, SetChanges, SetInput, WorkoutChanges,
};
use crate::storage::{Collection, Storage};

/// Nominal latency of the simulated remote API.
const DEFAULT_LATENCY: Duration = Duration::from_millis(100);

const DUPLICATE_SUFFIX: &str = " (Copia)";

pub struct Store<S: Storage> {
    storage: S,
    latency: Duration,
}

#[derive(Clone, Debug)]
pub struct PlanDetail {
    pub plan: plan::Record,
    pub exercises: Vec<exercise::Record>,
}

#[derive(Clone, Debug)]
pub struct WorkoutDetail {
    pub workout: workout::Record,
    pub plan: Option<PlanDetail>,
    pub sets: Vec<workout_set::Record>,
}

#[derive(Clone, Debug)]
pub struct SetDetail {
    pub set: workout_set::Record,
    pub workout: Option<workout::Record>,
    pub exercise: Option<exercise::Record>,
}

impl<S: Storage> Store<S> {
    pub fn new(storage: S) -> Self {
        Self::with_latency(storage, DEFAULT_LATENCY)
    }

    pub fn with_latency(storage: S, latency: Duration) -> Self {
        Self { storage, latency }
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// An unreadable or unparsable slot reads as an empty collection.
    fn load<T: DeserializeOwned>(&self, collection: Collection) -> Vec<T> {
        let blob = match self.storage.read(collection) {
            Ok(Some(blob)) => blob,
            Ok(None) => return Vec::new(),
            Err(err) => {
                tracing::warn!(
                    collection = collection.as_key(),
                    error = %err,
                    "unreadable collection slot; treating as empty"
                );
                return Vec::new();
            }
        };
        match serde_json::from_str(&blob) {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(
                    collection = collection.as_key(),
                    error = %err,
                    "collection slot failed to parse; treating as empty"
                );
                Vec::new()
            }
        }
    }

    fn save<T: Serialize>(&self, collection: Collection, records: &[T]) -> Result<(), StoreError> {
        let blob = serde_json::to_string(records)?;
        self.storage.write(collection, &blob)?;
        Ok(())
    }

    pub async fn list_plans(&self) -> Result<Vec<PlanDetail>, StoreError> {
        self.delay().await;
        let plans: Vec<plan::Record> = self.load(Collection::Plans);
        let exercises: Vec<exercise::Record> = self.load(Collection::Exercises);
        Ok(plans
            .into_iter()
            .map(|plan| {
                let exercises = exercises_for(&exercises, plan.id);
                PlanDetail { plan, exercises }
            })
            .collect())
    }

    pub async fn get_plan(&self, id: Uuid) -> Result<PlanDetail, StoreError> {
        self.delay().await;
        self.get_plan_inner(id)
    }

    fn get_plan_inner(&self, id: Uuid) -> Result<PlanDetail, StoreError> {
        let plans: Vec<plan::Record> = self.load(Collection::Plans);
        let plan = plans
            .into_iter()
            .find(|plan| plan.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("plan id {id}")))?;
        let all: Vec<exercise::Record> = self.load(Collection::Exercises);
        let exercises = exercises_for(&all, id);
        Ok(PlanDetail { plan, exercises })
    }

    pub async fn create_plan(&self, input: PlanInput) -> Result<PlanDetail, StoreError> {
        self.delay().await;
        self.create_plan_inner(input)
    }

    fn create_plan_inner(&self, input: PlanInput) -> Result<PlanDetail, StoreError> {
        ensure_non_empty("plan name", &input.name)?;
        for exercise in &input.exercises {
            validate_exercise_input(exercise)?;
        }

        let now = Utc::now();
        let plan = plan::Record {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        // Stage the whole batch before the first write; a rejected input
        // never leaves partial state behind.
        let mut created: Vec<exercise::Record> = input
            .exercises
            .into_iter()
            .map(|exercise| exercise::Record {
                id: Uuid::new_v4(),
                name: exercise.name,
                description: exercise.description,
                sets: exercise.sets,
                reps: exercise.reps,
                rest_time: exercise.rest_time,
                order: exercise.order,
                plan_id: plan.id,
                created_at: now,
                updated_at: now,
            })
            .collect();
        created.sort_by_key(|exercise| exercise.order);
        for (idx, exercise) in created.iter_mut().enumerate() {
            exercise.order = (idx + 1) as u32;
        }

        let mut plans: Vec<plan::Record> = self.load(Collection::Plans);
        plans.push(plan.clone());
        // Plans slot first: a torn write must not leave exercises pointing
        // at a plan that was never persisted.
        self.save(Collection::Plans, &plans)?;

        let mut exercises: Vec<exercise::Record> = self.load(Collection::Exercises);
        exercises.extend(created.iter().cloned());
        self.save(Collection::Exercises, &exercises)?;

        Ok(PlanDetail {
            plan,
            exercises: created,
        })
    }

    pub async fn update_plan(&self, id: Uuid, changes: PlanChanges) -> Result<PlanDetail, StoreError> {
        self.delay().await;
        if let Some(name) = &changes.name {
            ensure_non_empty("plan name", name)?;
        }

        let mut plans: Vec<plan::Record> = self.load(Collection::Plans);
        let plan = {
            let record = plans
                .iter_mut()
                .find(|plan| plan.id == id)
                .ok_or_else(|| StoreError::NotFound(format!("plan id {id}")))?;
            if let Some(name) = changes.name {
                record.name = name;
            }
            if let Some(description) = changes.description {
                record.description = Some(description);
            }
            if let Some(is_active) = changes.is_active {
                record.is_active = is_active;
            }
            record.updated_at = Utc::now();
            record.clone()
        };
        self.save(Collection::Plans, &plans)?;

        let all: Vec<exercise::Record> = self.load(Collection::Exercises);
        let exercises = exercises_for(&all, id);
        Ok(PlanDetail { plan, exercises })
    }

    pub async fn delete_plan(&self, id: Uuid) -> Result<(), StoreError> {
        self.delay().await;
        let mut plans: Vec<plan::Record> = self.load(Collection::Plans);
        let before = plans.len();
        plans.retain(|plan| plan.id != id);
        if plans.len() == before {
            return Err(StoreError::NotFound(format!("plan id {id}")));
        }
        self.save(Collection::Plans, &plans)?;

        let mut exercises: Vec<exercise::Record> = self.load(Collection::Exercises);
        let before = exercises.len();
        exercises.retain(|exercise| exercise.plan_id != id);
        if exercises.len() != before {
            tracing::debug!(
                plan_id = %id,
                removed = before - exercises.len(),
                "cascaded exercise delete"
            );
            self.save(Collection::Exercises, &exercises)?;
        }
        Ok(())
    }

    pub async fn duplicate_plan(&self, id: Uuid) -> Result<PlanDetail, StoreError> {
        self.delay().await;
        let original = self.get_plan_inner(id)?;
        self.create_plan_inner(PlanInput {
            name: format!("{}{DUPLICATE_SUFFIX}", original.plan.name),
            description: original.plan.description.clone(),
            exercises: original
                .exercises
                .iter()
                .map(|exercise| ExerciseInput {
                    name: exercise.name.clone(),
                    description: exercise.description.clone(),
                    sets: exercise.sets,
                    reps: exercise.reps,
                    rest_time: exercise.rest_time,
                    order: exercise.order,
                })
                .collect(),
        })
    }

    pub async fn exercises_for_plan(&self, plan_id: Uuid) -> Result<Vec<exercise::Record>, StoreError> {
        self.delay().await;
        let all: Vec<exercise::Record> = self.load(Collection::Exercises);
        Ok(exercises_for(&all, plan_id))
    }

    pub async fn get_exercise(&self, id: Uuid) -> Result<exercise::Record, StoreError> {
        self.delay().await;
        let all: Vec<exercise::Record> = self.load(Collection::Exercises);
        all.into_iter()
            .find(|exercise| exercise.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("exercise id {id}")))
    }

    pub async fn create_exercise(
        &self,
        plan_id: Uuid,
        input: ExerciseInput,
    ) -> Result<exercise::Record, StoreError> {
        self.delay().await;
        validate_exercise_input(&input)?;
        let plans: Vec<plan::Record> = self.load(Collection::Plans);
        if !plans.iter().any(|plan| plan.id == plan_id) {
            return Err(StoreError::NotFound(format!("plan id {plan_id}")));
        }

        let now = Utc::now();
        let insert_at = input.order.max(1);
        let mut all: Vec<exercise::Record> = self.load(Collection::Exercises);
        for existing in all.iter_mut().filter(|exercise| exercise.plan_id == plan_id) {
            if existing.order >= insert_at {
                existing.order += 1;
                existing.updated_at = now;
            }
        }

        let record = exercise::Record {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            sets: input.sets,
            reps: input.reps,
            rest_time: input.rest_time,
            order: insert_at,
            plan_id,
            created_at: now,
            updated_at: now,
        };
        let created_id = record.id;
        all.push(record);
        normalize_orders(&mut all, plan_id, now);
        self.save(Collection::Exercises, &all)?;

        all.into_iter()
            .find(|exercise| exercise.id == created_id)
            .ok_or_else(|| StoreError::NotFound(format!("exercise id {created_id}")))
    }

    pub async fn update_exercise(
        &self,
        id: Uuid,
        changes: ExerciseChanges,
    ) -> Result<exercise::Record, StoreError> {
        self.delay().await;
        if let Some(name) = &changes.name {
            ensure_non_empty("exercise name", name)?;
        }
        if let Some(sets) = changes.sets {
            ensure_at_least_one("exercise target sets", sets)?;
        }
        if let Some(reps) = changes.reps {
            ensure_at_least_one("exercise target reps", reps)?;
        }

        let mut all: Vec<exercise::Record> = self.load(Collection::Exercises);
        let now = Utc::now();
        let plan_id = {
            let record = all
                .iter_mut()
                .find(|exercise| exercise.id == id)
                .ok_or_else(|| StoreError::NotFound(format!("exercise id {id}")))?;
            if let Some(name) = changes.name {
                record.name = name;
            }
            if let Some(description) = changes.description {
                record.description = Some(description);
            }
            if let Some(sets) = changes.sets {
                record.sets = sets;
            }
            if let Some(reps) = changes.reps {
                record.reps = reps;
            }
            if let Some(rest_time) = changes.rest_time {
                record.rest_time = rest_time;
            }
            record.updated_at = now;
            record.plan_id
        };

        if let Some(to) = changes.order {
            reposition_exercise(&mut all, plan_id, id, to, now);
        }
        self.save(Collection::Exercises, &all)?;

        all.into_iter()
            .find(|exercise| exercise.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("exercise id {id}")))
    }

    pub async fn delete_exercise(&self, id: Uuid) -> Result<(), StoreError> {
        self.delay().await;
        let mut all: Vec<exercise::Record> = self.load(Collection::Exercises);
        let index = all
            .iter()
            .position(|exercise| exercise.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("exercise id {id}")))?;
        let removed = all.remove(index);
        // Historical sets keep their exercise id; joins surface the gap as None.
        normalize_orders(&mut all, removed.plan_id, Utc::now());
        self.save(Collection::Exercises, &all)?;
        Ok(())
    }

    pub async fn list_workouts(&self) -> Result<Vec<WorkoutDetail>, StoreError> {
        self.delay().await;
        let workouts: Vec<workout::Record> = self.load(Collection::Workouts);
        Ok(self.join_workouts(workouts))
    }

    pub async fn workouts_for_plan(&self, plan_id: Uuid) -> Result<Vec<WorkoutDetail>, StoreError> {
        self.delay().await;
        let workouts: Vec<workout::Record> = self.load(Collection::Workouts);
        let matching = workouts
            .into_iter()
            .filter(|workout| workout.plan_id == plan_id)
            .collect();
        Ok(self.join_workouts(matching))
    }

    pub async fn get_workout(&self, id: Uuid) -> Result<WorkoutDetail, StoreError> {
        self.delay().await;
        let workouts: Vec<workout::Record> = self.load(Collection::Workouts);
        let workout = workouts
            .into_iter()
            .find(|workout| workout.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("workout id {id}")))?;
        Ok(self.join_workout(workout))
    }

    pub async fn start_workout(
        &self,
        plan_id: Uuid,
        notes: Option<String>,
    ) -> Result<WorkoutDetail, StoreError> {
        self.delay().await;
        let plan = self.get_plan_inner(plan_id)?;

        let workout = workout::Record {
            id: Uuid::new_v4(),
            plan_id,
            started_at: Utc::now(),
            completed_at: None,
            notes,
        };
        let mut workouts: Vec<workout::Record> = self.load(Collection::Workouts);
        workouts.push(workout.clone());
        self.save(Collection::Workouts, &workouts)?;

        Ok(WorkoutDetail {
            workout,
            plan: Some(plan),
            sets: Vec::new(),
        })
    }

    pub async fn complete_workout(
        &self,
        id: Uuid,
        notes: Option<String>,
    ) -> Result<WorkoutDetail, StoreError> {
        self.delay().await;
        let mut workouts: Vec<workout::Record> = self.load(Collection::Workouts);
        let workout = {
            let record = workouts
                .iter_mut()
                .find(|workout| workout.id == id)
                .ok_or_else(|| StoreError::NotFound(format!("workout id {id}")))?;
            record.completed_at = Some(Utc::now());
            if let Some(notes) = notes {
                record.notes = Some(notes);
            }
            record.clone()
        };
        self.save(Collection::Workouts, &workouts)?;
        Ok(self.join_workout(workout))
    }

    pub async fn update_workout(
        &self,
        id: Uuid,
        changes: WorkoutChanges,
    ) -> Result<WorkoutDetail, StoreError> {
        self.delay().await;
        let mut workouts: Vec<workout::Record> = self.load(Collection::Workouts);
        let workout = {
            let record = workouts
                .iter_mut()
                .find(|workout| workout.id == id)
                .ok_or_else(|| StoreError::NotFound(format!("workout id {id}")))?;
            if let Some(notes) = changes.notes {
                record.notes = Some(notes);
            }
            record.clone()
        };
        self.save(Collection::Workouts, &workouts)?;
        Ok(self.join_workout(workout))
    }

    pub async fn delete_workout(&self, id: Uuid) -> Result<(), StoreError> {
        self.delay().await;
        let mut workouts: Vec<workout::Record> = self.load(Collection::Workouts);
        let before = workouts.len();
        workouts.retain(|workout| workout.id != id);
        if workouts.len() == before {
            return Err(StoreError::NotFound(format!("workout id {id}")));
        }
        self.save(Collection::Workouts, &workouts)?;

        let mut sets: Vec<workout_set::Record> = self.load(Collection::Sets);
        let before = sets.len();
        sets.retain(|set| set.workout_id != id);
        if sets.len() != before {
            tracing::debug!(
                workout_id = %id,
                removed = before - sets.len(),
                "cascaded set delete"
            );
            self.save(Collection::Sets, &sets)?;
        }
        Ok(())
    }

    pub async fn sets_for_workout(
        &self,
        workout_id: Uuid,
    ) -> Result<Vec<workout_set::Record>, StoreError> {
        self.delay().await;
        let sets: Vec<workout_set::Record> = self.load(Collection::Sets);
        Ok(sets
            .into_iter()
            .filter(|set| set.workout_id == workout_id)
            .collect())
    }

    pub async fn get_set(&self, id: Uuid) -> Result<SetDetail, StoreError> {
        self.delay().await;
        let sets: Vec<workout_set::Record> = self.load(Collection::Sets);
        let set = sets
            .into_iter()
            .find(|set| set.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("set id {id}")))?;
        Ok(self.join_set(set))
    }

    pub async fn record_set(&self, input: SetInput) -> Result<SetDetail, StoreError> {
        self.delay().await;
        ensure_at_least_one("set number", input.set_number)?;
        ensure_valid_weight(input.weight)?;

        let workouts: Vec<workout::Record> = self.load(Collection::Workouts);
        let workout = workouts
            .into_iter()
            .find(|workout| workout.id == input.workout_id)
            .ok_or_else(|| StoreError::NotFound(format!("workout id {}", input.workout_id)))?;
        let exercises: Vec<exercise::Record> = self.load(Collection::Exercises);
        let exercise = exercises
            .into_iter()
            .find(|exercise| exercise.id == input.exercise_id)
            .ok_or_else(|| StoreError::NotFound(format!("exercise id {}", input.exercise_id)))?;

        let set = workout_set::Record {
            id: Uuid::new_v4(),
            workout_id: input.workout_id,
            exercise_id: input.exercise_id,
            set_number: input.set_number,
            weight: input.weight,
            reps: input.reps,
            completed_at: Utc::now(),
        };
        let mut sets: Vec<workout_set::Record> = self.load(Collection::Sets);
        sets.push(set.clone());
        self.save(Collection::Sets, &sets)?;

        Ok(SetDetail {
            set,
            workout: Some(workout),
            exercise: Some(exercise),
        })
    }

    pub async fn update_set(&self, id: Uuid, changes: SetChanges) -> Result<SetDetail, StoreError> {
        self.delay().await;
        if let Some(weight) = changes.weight {
            ensure_valid_weight(weight)?;
        }

        let mut sets: Vec<workout_set::Record> = self.load(Collection::Sets);
        let set = {
            let record = sets
                .iter_mut()
                .find(|set| set.id == id)
                .ok_or_else(|| StoreError::NotFound(format!("set id {id}")))?;
            if let Some(weight) = changes.weight {
                record.weight = weight;
            }
            if let Some(reps) = changes.reps {
                record.reps = reps;
            }
            record.clone()
        };
        self.save(Collection::Sets, &sets)?;
        Ok(self.join_set(set))
    }

    pub async fn delete_set(&self, id: Uuid) -> Result<(), StoreError> {
        self.delay().await;
        let mut sets: Vec<workout_set::Record> = self.load(Collection::Sets);
        let before = sets.len();
        sets.retain(|set| set.id != id);
        if sets.len() == before {
            return Err(StoreError::NotFound(format!("set id {id}")));
        }
        self.save(Collection::Sets, &sets)?;
        Ok(())
    }

    fn join_workouts(&self, workouts: Vec<workout::Record>) -> Vec<WorkoutDetail> {
        let plans: Vec<plan::Record> = self.load(Collection::Plans);
        let exercises: Vec<exercise::Record> = self.load(Collection::Exercises);
        let sets: Vec<workout_set::Record> = self.load(Collection::Sets);
        workouts
            .into_iter()
            .map(|workout| {
                let plan = plans
                    .iter()
                    .find(|plan| plan.id == workout.plan_id)
                    .map(|plan| PlanDetail {
                        plan: plan.clone(),
                        exercises: exercises_for(&exercises, plan.id),
                    });
                let sets = sets
                    .iter()
                    .filter(|set| set.workout_id == workout.id)
                    .cloned()
                    .collect();
                WorkoutDetail { workout, plan, sets }
            })
            .collect()
    }

    fn join_workout(&self, workout: workout::Record) -> WorkoutDetail {
        self.join_workouts(vec![workout]).remove(0)
    }

    fn join_set(&self, set: workout_set::Record) -> SetDetail {
        let workouts: Vec<workout::Record> = self.load(Collection::Workouts);
        let exercises: Vec<exercise::Record> = self.load(Collection::Exercises);
        SetDetail {
            workout: workouts.into_iter().find(|workout| workout.id == set.workout_id),
            exercise: exercises
                .into_iter()
                .find(|exercise| exercise.id == set.exercise_id),
            set,
        }
    }
}

fn exercises_for(records: &[exercise::Record], plan_id: Uuid) -> Vec<exercise::Record> {
    let mut exercises: Vec<exercise::Record> = records
        .iter()
        .filter(|exercise| exercise.plan_id == plan_id)
        .cloned()
        .collect();
    exercises.sort_by_key(|exercise| exercise.order);
    exercises
}

// Order values within a plan stay contiguous and 1-based. Stable sort keeps
// creation order for ties.
fn normalize_orders(records: &mut [exercise::Record], plan_id: Uuid, now: DateTime<Utc>) {
    let mut indices: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, exercise)| exercise.plan_id == plan_id)
        .map(|(index, _)| index)
        .collect();
    indices.sort_by_key(|&index| records[index].order);
    for (position, &index) in indices.iter().enumerate() {
        let order = (position + 1) as u32;
        let record = &mut records[index];
        if record.order != order {
            record.order = order;
            record.updated_at = now;
        }
    }
}

fn reposition_exercise(
    records: &mut [exercise::Record],
    plan_id: Uuid,
    id: Uuid,
    to: u32,
    now: DateTime<Utc>,
) {
    let mut ordered: Vec<Uuid> = {
        let mut indices: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, exercise)| exercise.plan_id == plan_id)
            .map(|(index, _)| index)
            .collect();
        indices.sort_by_key(|&index| records[index].order);
        indices.into_iter().map(|index| records[index].id).collect()
    };

    let Some(current) = ordered.iter().position(|&member| member == id) else {
        return;
    };
    let moving = ordered.remove(current);
    let mut desired = (to as usize).saturating_sub(1);
    if desired > ordered.len() {
        desired = ordered.len();
    }
    ordered.insert(desired, moving);

    for record in records.iter_mut().filter(|exercise| exercise.plan_id == plan_id) {
        if let Some(position) = ordered.iter().position(|&member| member == record.id) {
            let order = (position + 1) as u32;
            if record.order != order {
                record.order = order;
                record.updated_at = now;
            }
        }
    }
}

fn validate_exercise_input(input: &ExerciseInput) -> Result<(), StoreError> {
    ensure_non_empty("exercise name", &input.name)?;
    ensure_at_least_one("exercise target sets", input.sets)?;
    ensure_at_least_one("exercise target reps", input.reps)?;
    Ok(())
}

fn ensure_non_empty(label: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::InvalidInput(format!("{label} cannot be empty")));
    }
    Ok(())
}

fn ensure_at_least_one(label: &str, value: u32) -> Result<(), StoreError> {
    if value < 1 {
        return Err(StoreError::InvalidInput(format!(
            "{label} must be at least 1"
        )));
    }
    Ok(())
}

fn ensure_valid_weight(value: f64) -> Result<(), StoreError> {
    if !value.is_finite() || value < 0.0 {
        return Err(StoreError::InvalidInput(format!(
            "set weight must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}
