use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use pixelmill::queue::lease::WorkerLease;
use pixelmill::queue::record::{Operation, SubjectKind, SubjectRef, Task, TaskKind};
use pixelmill::queue::{Claim, TaskQueue};

fn subject(id: i64) -> SubjectRef {
    SubjectRef {
        kind: SubjectKind::Project,
        id,
    }
}

fn derive_task(id: i64) -> Task {
    Task::new(TaskKind::derive(Operation::Create, subject(id)), "standard")
}

#[test]
fn open_lays_out_queue_root() {
    let root = tempfile::tempdir().unwrap();
    let queue = TaskQueue::open(root.path()).unwrap();
    assert!(queue.pending_dir().is_dir());
    assert!(queue.in_flight_dir().is_dir());
    assert!(!queue.lease_path().exists());
}

#[test]
fn enqueue_writes_one_pending_record() {
    let root = tempfile::tempdir().unwrap();
    let queue = TaskQueue::open(root.path()).unwrap();
    let record = queue.enqueue(&derive_task(1)).unwrap();
    assert!(queue.pending_dir().join(&record.file_name).is_file());
    assert_eq!(queue.peek_all().unwrap().len(), 1);
}

#[test]
fn peek_all_returns_oldest_first() {
    let root = tempfile::tempdir().unwrap();
    let queue = TaskQueue::open(root.path()).unwrap();

    let mut old = derive_task(1);
    old.enqueued_at = Utc::now() - ChronoDuration::seconds(30);
    let new = derive_task(2);

    // Enqueue newest first to prove ordering comes from the record, not
    // insertion order.
    queue.enqueue(&new).unwrap();
    queue.enqueue(&old).unwrap();

    let pending = queue.peek_all().unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].task.id, old.id);
    assert_eq!(pending[1].task.id, new.id);
}

#[test]
fn lower_priority_value_is_served_first() {
    let root = tempfile::tempdir().unwrap();
    let queue = TaskQueue::open(root.path()).unwrap();

    let mut urgent = derive_task(1).with_priority(0);
    urgent.enqueued_at = Utc::now();
    let mut routine = derive_task(2);
    routine.enqueued_at = Utc::now() - ChronoDuration::seconds(60);

    queue.enqueue(&routine).unwrap();
    queue.enqueue(&urgent).unwrap();

    let pending = queue.peek_all().unwrap();
    assert_eq!(pending[0].task.id, urgent.id);
}

#[test]
fn priority_order_is_numeric_across_the_full_range() {
    let root = tempfile::tempdir().unwrap();
    let queue = TaskQueue::open(root.path()).unwrap();

    // 100 vs 99 would invert under a two-digit ordering key.
    let low = derive_task(1).with_priority(100);
    let high = derive_task(2).with_priority(99);
    queue.enqueue(&low).unwrap();
    queue.enqueue(&high).unwrap();

    let pending = queue.peek_all().unwrap();
    assert_eq!(pending[0].task.priority, 99);
    assert_eq!(pending[1].task.priority, 100);
}

#[test]
fn claim_is_atomic_and_single_winner() {
    let root = tempfile::tempdir().unwrap();
    let queue = TaskQueue::open(root.path()).unwrap();
    let record = queue.enqueue(&derive_task(1)).unwrap();

    let first = queue.claim(&record).unwrap();
    let Claim::Claimed(in_flight) = first else {
        panic!("first claim must win");
    };
    assert!(in_flight.path.is_file());
    assert!(!queue.pending_dir().join(&record.file_name).exists());

    // The same record can never be claimed twice.
    match queue.claim(&record).unwrap() {
        Claim::AlreadyClaimed => {}
        Claim::Claimed(_) => panic!("second claim must lose"),
    }
}

#[test]
fn complete_destroys_the_record() {
    let root = tempfile::tempdir().unwrap();
    let queue = TaskQueue::open(root.path()).unwrap();
    let record = queue.enqueue(&derive_task(1)).unwrap();
    let Claim::Claimed(in_flight) = queue.claim(&record).unwrap() else {
        panic!("claim failed");
    };
    queue.complete(in_flight).unwrap();

    let status = queue.status(Duration::from_secs(300)).unwrap();
    assert_eq!(status.pending, 0);
    assert_eq!(status.in_flight, 0);
    assert_eq!(status.dead_letter, 0);
}

#[test]
fn fail_moves_record_to_dead_letter_with_context() {
    let root = tempfile::tempdir().unwrap();
    let queue = TaskQueue::open(root.path()).unwrap();
    let record = queue.enqueue(&derive_task(7)).unwrap();
    let Claim::Claimed(in_flight) = queue.claim(&record).unwrap() else {
        panic!("claim failed");
    };
    queue.fail(in_flight, "encoder exploded").unwrap();

    let dead = queue.dead_letters().unwrap();
    assert_eq!(dead.len(), 1);
    assert!(dead[0].file_name.starts_with("failed_"));
    assert_eq!(dead[0].task.kind.subject().id, 7);
    assert_eq!(dead[0].task.last_error.as_deref(), Some("encoder exploded"));

    let status = queue.status(Duration::from_secs(300)).unwrap();
    assert_eq!(status.in_flight, 0);
    assert_eq!(status.dead_letter, 1);
}

#[test]
fn retry_requeues_with_bumped_attempts_and_same_position() {
    let root = tempfile::tempdir().unwrap();
    let queue = TaskQueue::open(root.path()).unwrap();
    let record = queue.enqueue(&derive_task(1)).unwrap();
    let Claim::Claimed(in_flight) = queue.claim(&record).unwrap() else {
        panic!("claim failed");
    };
    queue.retry(in_flight, "transient wobble").unwrap();

    let pending = queue.peek_all().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].file_name, record.file_name);
    assert_eq!(pending[0].task.attempts, 1);
    assert_eq!(pending[0].task.last_error.as_deref(), Some("transient wobble"));
}

#[test]
fn status_reports_worker_liveness_from_the_lease() {
    let root = tempfile::tempdir().unwrap();
    let queue = TaskQueue::open(root.path()).unwrap();
    let ttl = Duration::from_secs(300);

    assert!(!queue.status(ttl).unwrap().worker_alive);

    WorkerLease::new(Uuid::new_v4())
        .write(&queue.lease_path())
        .unwrap();
    assert!(queue.status(ttl).unwrap().worker_alive);

    let stale = WorkerLease {
        owner_id: Uuid::new_v4(),
        started_at: Utc::now() - ChronoDuration::seconds(301),
    };
    stale.write(&queue.lease_path()).unwrap();
    assert!(!queue.status(ttl).unwrap().worker_alive);
}

#[test]
fn lease_write_is_atomic_and_round_trips() {
    let root = tempfile::tempdir().unwrap();
    let queue = TaskQueue::open(root.path()).unwrap();
    let owner = Uuid::new_v4();

    WorkerLease::new(owner).write(&queue.lease_path()).unwrap();
    let lease = WorkerLease::read(&queue.lease_path()).unwrap();
    assert_eq!(lease.owner_id, owner);

    // The temp sibling must be renamed away, never left behind.
    for entry in std::fs::read_dir(root.path()).unwrap() {
        let name = entry.unwrap().file_name().into_string().unwrap();
        assert!(!name.contains(".tmp-"), "leftover temp file {name}");
    }
}

#[test]
fn corrupt_lease_reads_as_absent() {
    let root = tempfile::tempdir().unwrap();
    let queue = TaskQueue::open(root.path()).unwrap();
    std::fs::write(queue.lease_path(), b"not json at all").unwrap();
    assert!(WorkerLease::read(&queue.lease_path()).is_none());
}

#[test]
fn task_kind_round_trips_through_json() {
    let task = Task::new(
        TaskKind::Cleanup {
            subject: subject(9),
            stale_path: "/data/old/banner.png".into(),
        },
        "high",
    );
    let json = serde_json::to_string(&task).unwrap();
    let back: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(back, task);
    assert!(json.contains("\"op\""));
}
