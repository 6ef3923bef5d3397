use rand::Rng;
use rand::seq::SliceRandom;

use crate::db::schema::Task;

#[derive(Debug, thiserror::Error)]
pub enum TaskValidationError {
    #[error("a task with ID {0} already exists")]
    DuplicateId(i32),
    #[error("there are no eligible tasks in the catalog")]
    EmptyCatalog,
}

#[derive(Debug, thiserror::Error)]
#[error("requested {requested} distinct tasks but only {available} are eligible")]
pub struct InsufficientCatalogError {
    pub requested: usize,
    pub available: usize,
}

/// In-memory catalog used while assembling a task set (bulk file loads,
/// reload validation) before it is pushed to the store.
#[derive(Default)]
pub struct TaskCatalog {
    tasks: Vec<Task>,
    max_task_id: i32,
}

impl TaskCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get_by_id(&self, task_id: i32) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn max_task_id(&self) -> i32 {
        self.max_task_id
    }

    pub fn next_task_id(&mut self) -> i32 {
        self.max_task_id += 1;
        self.max_task_id
    }

    pub fn add(&mut self, task: Task) -> Result<(), TaskValidationError> {
        if self.get_by_id(task.id).is_some() {
            return Err(TaskValidationError::DuplicateId(task.id));
        }
        if task.id > self.max_task_id {
            self.max_task_id = task.id;
        }
        self.tasks.push(task);
        Ok(())
    }
}

fn standard_tasks(tasks: &[Task]) -> Vec<&Task> {
    tasks.iter().filter(|t| t.weight > 0).collect()
}

/// Uniform draw among standard tasks. Weight is an eligibility gate only;
/// its magnitude does not bias the draw.
pub fn pick_random_task(tasks: &[Task]) -> Result<&Task, TaskValidationError> {
    pick_random_task_with(tasks, &mut rand::thread_rng())
}

pub fn pick_random_task_with<'a, R: Rng>(tasks: &'a [Task], rng: &mut R) -> Result<&'a Task, TaskValidationError> {
    standard_tasks(tasks)
        .choose(rng)
        .copied()
        .ok_or(TaskValidationError::EmptyCatalog)
}

/// `n` pairwise-distinct standard tasks, without replacement.
pub fn pick_random_tasks(tasks: &[Task], n: usize) -> Result<Vec<&Task>, InsufficientCatalogError> {
    pick_random_tasks_with(tasks, n, &mut rand::thread_rng())
}

pub fn pick_random_tasks_with<'a, R: Rng>(
    tasks: &'a [Task],
    n: usize,
    rng: &mut R,
) -> Result<Vec<&'a Task>, InsufficientCatalogError> {
    let standard = standard_tasks(tasks);

    if standard.len() < n {
        return Err(InsufficientCatalogError {
            requested: n,
            available: standard.len(),
        });
    }

    Ok(standard.choose_multiple(rng, n).copied().collect())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn task(id: i32, weight: i32) -> Task {
        Task {
            id,
            description: format!("task {}", id),
            instruction: "Submit a screenshot".to_owned(),
            weight,
        }
    }

    #[test]
    fn add_rejects_duplicate_ids() {
        let mut catalog = TaskCatalog::new();
        catalog.add(task(1, 1)).unwrap();

        match catalog.add(task(1, 1)) {
            Err(TaskValidationError::DuplicateId(1)) => {}
            other => panic!("expected duplicate ID error, got {:?}", other.err()),
        }
        assert_eq!(catalog.tasks().len(), 1);
    }

    #[test]
    fn next_task_id_follows_the_highest_seen() {
        let mut catalog = TaskCatalog::new();
        catalog.add(task(4, 1)).unwrap();
        catalog.add(task(2, 1)).unwrap();

        assert_eq!(catalog.max_task_id(), 4);
        assert_eq!(catalog.next_task_id(), 5);
        assert_eq!(catalog.next_task_id(), 6);
    }

    #[test]
    fn random_task_fails_on_empty_catalog() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pick_random_task_with(&[], &mut rng).is_err());

        // Only a weight-0 task present: still no eligible tasks.
        assert!(pick_random_task_with(&[task(1, 0)], &mut rng).is_err());
    }

    #[test]
    fn random_tasks_are_distinct() {
        let tasks: Vec<Task> = (1..=8).map(|i| task(i, 1)).collect();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..20 {
            let picked = pick_random_tasks_with(&tasks, 5, &mut rng).unwrap();
            let ids: HashSet<i32> = picked.iter().map(|t| t.id).collect();
            assert_eq!(ids.len(), 5);
        }
    }

    #[test]
    fn oversized_request_fails() {
        let tasks: Vec<Task> = (1..=3).map(|i| task(i, 1)).collect();
        let mut rng = StdRng::seed_from_u64(7);

        let err = pick_random_tasks_with(&tasks, 4, &mut rng).unwrap_err();
        assert_eq!(err.requested, 4);
        assert_eq!(err.available, 3);
    }

    #[test]
    fn zero_weight_tasks_are_never_sampled() {
        let tasks = vec![task(1, 1), task(2, 0), task(3, 1), task(4, 0)];
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let picked = pick_random_task_with(&tasks, &mut rng).unwrap();
            assert!(picked.weight > 0);

            let picked = pick_random_tasks_with(&tasks, 2, &mut rng).unwrap();
            assert!(picked.iter().all(|t| t.weight > 0));
        }
    }

    #[test]
    fn weight_zero_counts_against_availability() {
        let tasks = vec![task(1, 1), task(2, 0)];
        let mut rng = StdRng::seed_from_u64(7);
        assert!(pick_random_tasks_with(&tasks, 2, &mut rng).is_err());
    }
}
