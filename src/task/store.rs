//! Task repository over [`Storage`].
//!
//! Tasks live under `task/<owner>/<id>`. A store-wide creation sequence is kept
//! at `meta/task_seq` and written in the same batch as each new task, so a
//! restart never hands out a sequence number twice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use super::{Task, TaskFilter, TaskPage};
use crate::error::{PlannerResult, TaskError};
use crate::store::{Storage, WriteOp};

const SEQ_KEY: &[u8] = b"meta/task_seq";

pub fn task_key(owner: &str, id: &str) -> Vec<u8> {
    format!("task/{owner}/{id}").into_bytes()
}

fn owner_prefix(owner: &str) -> Vec<u8> {
    format!("task/{owner}/").into_bytes()
}

/// Persistent task collection with per-owner write serialization.
pub struct TaskStore {
    storage: Arc<Storage>,
    next_seq: AtomicU64,
    /// Serializes read-modify-write cycles on one owner's tasks.
    owner_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TaskStore {
    /// Open over `storage`, restoring the sequence counter.
    pub fn open(storage: Arc<Storage>) -> PlannerResult<Self> {
        let stored: u64 = storage.get_value(SEQ_KEY)?.unwrap_or(0);
        // Concurrent inserts for different owners may leave a stale mark.
        let highest = storage
            .scan_values::<Task>(b"task/")?
            .iter()
            .map(|t| t.seq)
            .max()
            .unwrap_or(0);
        let last = stored.max(highest);
        Ok(Self {
            storage,
            next_seq: AtomicU64::new(last + 1),
            owner_locks: DashMap::new(),
        })
    }

    /// The write lock for `owner`. Hold it across a get → modify → save cycle.
    pub fn owner_lock(&self, owner: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.owner_locks
                .entry(owner.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Allocate the next creation sequence number.
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Persist a new task together with the sequence high-water mark.
    pub fn insert(&self, task: &Task) -> PlannerResult<()> {
        self.storage.apply(&[
            WriteOp::put_value(task_key(&task.owner, &task.id), task)?,
            WriteOp::put_value(SEQ_KEY, &task.seq)?,
        ])?;
        Ok(())
    }

    /// Overwrite an existing task.
    pub fn save(&self, task: &Task) -> PlannerResult<()> {
        self.storage
            .put_value(&task_key(&task.owner, &task.id), task)?;
        Ok(())
    }

    /// The write that [`save`](Self::save) would perform, for batching.
    pub fn save_op(task: &Task) -> PlannerResult<WriteOp> {
        Ok(WriteOp::put_value(task_key(&task.owner, &task.id), task)?)
    }

    pub fn get(&self, owner: &str, id: &str) -> PlannerResult<Task> {
        self.storage
            .get_value(&task_key(owner, id))?
            .ok_or_else(|| TaskError::NotFound { id: id.to_string() }.into())
    }

    /// Delete a task. Missing tasks are an error.
    pub fn delete(&self, owner: &str, id: &str) -> PlannerResult<()> {
        if self.storage.remove(&task_key(owner, id))? {
            Ok(())
        } else {
            Err(TaskError::NotFound { id: id.to_string() }.into())
        }
    }

    /// All of `owner`'s tasks, oldest first.
    pub fn list(&self, owner: &str) -> PlannerResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self.storage.scan_values(&owner_prefix(owner))?;
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq)));
        Ok(tasks)
    }

    /// Filtered, paginated listing, newest first.
    pub fn query(&self, owner: &str, filter: &TaskFilter) -> PlannerResult<TaskPage> {
        let (page, page_size) = filter.paging()?;
        let mut matching: Vec<Task> = self
            .list(owner)?
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect();
        matching.reverse();

        let total = matching.len();
        let skip = (page as usize - 1).saturating_mul(page_size as usize);
        let tasks = matching
            .into_iter()
            .skip(skip)
            .take(page_size as usize)
            .collect();
        Ok(TaskPage {
            tasks,
            total,
            page,
            page_size,
        })
    }

    /// Number of tasks across all owners.
    pub fn count_all(&self) -> PlannerResult<usize> {
        Ok(self.storage.scan_prefix(b"task/")?.len())
    }
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("next_seq", &self.next_seq.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlannerError;
    use crate::task::{NewTask, TaskStatus};
    use chrono::{Duration, TimeZone, Utc};

    fn make(store: &TaskStore, owner: &str, title: &str, offset_min: i64) -> Task {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(offset_min);
        let seq = store.next_seq();
        let task = Task::from_new(
            NewTask::titled(title),
            owner,
            format!("{title}-{seq}"),
            seq,
            now,
        )
        .unwrap();
        store.insert(&task).unwrap();
        task
    }

    #[test]
    fn insert_get_delete() {
        let store = TaskStore::open(Arc::new(Storage::memory_only())).unwrap();
        let t = make(&store, "alice", "a", 0);
        assert_eq!(store.get("alice", &t.id).unwrap(), t);
        assert!(matches!(
            store.get("bob", &t.id),
            Err(PlannerError::Task(TaskError::NotFound { .. }))
        ));
        store.delete("alice", &t.id).unwrap();
        assert!(store.delete("alice", &t.id).is_err());
    }

    #[test]
    fn owners_are_isolated() {
        let store = TaskStore::open(Arc::new(Storage::memory_only())).unwrap();
        make(&store, "alice", "a", 0);
        make(&store, "alicia", "b", 1);
        assert_eq!(store.list("alice").unwrap().len(), 1);
        assert_eq!(store.count_all().unwrap(), 2);
    }

    #[test]
    fn query_filters_and_pages_newest_first() {
        let store = TaskStore::open(Arc::new(Storage::memory_only())).unwrap();
        for i in 0..5 {
            make(&store, "u", &format!("t{i}"), i);
        }
        let mut done = store.list("u").unwrap()[0].clone();
        done.transition(TaskStatus::Completed, done.created_at).unwrap();
        store.save(&done).unwrap();

        let page = store
            .query(
                "u",
                &TaskFilter {
                    status: Some(TaskStatus::Pending),
                    page: Some(2),
                    page_size: Some(3),
                    ..TaskFilter::default()
                },
            )
            .unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.tasks.len(), 1);
        assert_eq!(page.tasks[0].title, "t1");
    }

    #[test]
    fn sequence_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = Arc::new(Storage::with_persistence(dir.path()).unwrap());
        let first = {
            let store = TaskStore::open(Arc::clone(&storage)).unwrap();
            make(&store, "u", "a", 0).seq
        };
        let store = TaskStore::open(storage).unwrap();
        assert!(store.next_seq() > first);
    }
}
