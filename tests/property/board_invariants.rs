#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Property-based tests for the board store and the reconciler.
//!
//! Uses proptest to verify:
//! 1. Any sequence of local and remote operations keeps every board
//!    invariant (referential integrity, status/column agreement).
//! 2. A reorder within one column is a permutation of that column.
//! 3. A cross-column move removes the task from exactly one column and
//!    adds it to exactly one other.
//! 4. Remote deletes and moves are idempotent.

use collabflow::board::{BoardStore, Task, TaskPatch};
use collabflow::schema;
use collabflow::sync::{MoveIntent, Reconciler, TaskDraft};
use collabflow_proto::event::{ServerEvent, TaskCreated, TaskDeleted, TaskMoved, TaskUpdated};
use collabflow_proto::vocab;
use proptest::prelude::*;

const COLUMNS: [&str; 3] = ["col-1", "col-2", "col-3"];

#[derive(Debug, Clone)]
enum Op {
    Create { column: usize, id: u8 },
    Update { id: u8, title: String, status: Option<usize> },
    Move { id: u8, column: usize, from_column: usize, from_index: Option<usize>, to_index: Option<usize> },
    Delete { id: u8 },
    RemoteCreate { id: u8, status: usize },
    RemoteMove { id: u8, status: usize },
    RemoteDelete { id: u8 },
}

fn task_id(n: u8) -> String {
    format!("t{n}")
}

fn status_of(column: usize) -> &'static str {
    ["To Do", "In Progress", "Done"][column]
}

fn arb_op() -> impl Strategy<Value = Op> {
    let id = 0u8..8;
    let column = 0usize..3;
    prop_oneof![
        (column.clone(), id.clone()).prop_map(|(column, id)| Op::Create { column, id }),
        (id.clone(), "[a-z ]{0,12}", prop::option::of(column.clone()))
            .prop_map(|(id, title, status)| Op::Update { id, title, status }),
        (
            id.clone(),
            column.clone(),
            column.clone(),
            prop::option::of(0usize..10),
            prop::option::of(0usize..10)
        )
            .prop_map(|(id, column, from_column, from_index, to_index)| Op::Move {
                id,
                column,
                from_column,
                from_index,
                to_index,
            }),
        id.clone().prop_map(|id| Op::Delete { id }),
        (id.clone(), column.clone()).prop_map(|(id, status)| Op::RemoteCreate { id, status }),
        (id.clone(), column).prop_map(|(id, status)| Op::RemoteMove { id, status }),
        id.prop_map(|id| Op::RemoteDelete { id }),
    ]
}

fn remote(event_id: u8, status: usize) -> Task {
    Task {
        id: task_id(event_id),
        title: format!("remote {event_id}"),
        description: String::new(),
        priority: "Low".into(),
        assignee: None,
        due_date: None,
        status: status_of(status).into(),
    }
}

fn apply(engine: &mut Reconciler, op: &Op) {
    // Errors and conflicts are expected for random input; only the
    // resulting board matters.
    match op {
        Op::Create { column, id } => {
            let _ = engine.create(
                COLUMNS[*column],
                TaskDraft {
                    id: Some(task_id(*id)),
                    ..TaskDraft::titled("local")
                },
            );
        }
        Op::Update { id, title, status } => {
            let _ = engine.update(
                &task_id(*id),
                TaskPatch {
                    title: Some(title.clone()),
                    status: status.map(|c| status_of(c).to_string()),
                    ..TaskPatch::default()
                },
            );
        }
        Op::Move { id, column, from_column, from_index, to_index } => {
            let _ = engine.move_task(&MoveIntent {
                task_id: task_id(*id),
                from_column: COLUMNS[*from_column].into(),
                to_column: COLUMNS[*column].into(),
                from_index: *from_index,
                to_index: *to_index,
            });
        }
        Op::Delete { id } => {
            engine.delete(&task_id(*id));
        }
        Op::RemoteCreate { id, status } => {
            engine.apply_remote(&ServerEvent::TaskCreated(TaskCreated {
                task: schema::task_to_wire("p1", &remote(*id, *status)),
                room_id: "p1".into(),
                actor_id: Some("them".into()),
            }));
        }
        Op::RemoteMove { id, status } => {
            engine.apply_remote(&ServerEvent::TaskMoved(TaskMoved {
                task_id: task_id(*id),
                old_status: String::new(),
                new_status: vocab::status_to_wire(status_of(*status)),
                room_id: "p1".into(),
                actor_id: Some("them".into()),
            }));
        }
        Op::RemoteDelete { id } => {
            engine.apply_remote(&ServerEvent::TaskDeleted(TaskDeleted {
                task_id: task_id(*id),
                room_id: "p1".into(),
                actor_id: Some("them".into()),
            }));
        }
    }
}

proptest! {
    #[test]
    fn invariants_hold_after_any_sequence(ops in prop::collection::vec(arb_op(), 0..60)) {
        let mut engine = Reconciler::new("p1", Some("me".into()));
        for op in &ops {
            apply(&mut engine, op);
            let board = engine.board();
            prop_assert!(board.check_invariants().is_ok(), "after {:?}: {:?}", op, board.check_invariants());
            for column in board.columns.values() {
                for id in &column.task_ids {
                    prop_assert_eq!(&board.tasks[id].status, &column.title);
                }
            }
        }
    }

    #[test]
    fn same_column_reorder_is_a_permutation(
        count in 1usize..8,
        from in 0usize..8,
        to in 0usize..10,
    ) {
        let from = from % count;
        let mut store = BoardStore::new();
        for n in 0..count {
            let task = remote(u8::try_from(n).unwrap(), 0);
            store.insert_task("col-1", task, None).unwrap();
        }
        let before = store.board().columns["col-1"].task_ids.clone();
        let moving = before[from].clone();

        store.relocate_task(&moving, "col-1", Some(from), Some(to)).unwrap();

        let after = store.board().columns["col-1"].task_ids.clone();
        let mut sorted_before = before.clone();
        let mut sorted_after = after.clone();
        sorted_before.sort();
        sorted_after.sort();
        prop_assert_eq!(sorted_before, sorted_after);
        prop_assert_eq!(&after[to.min(count - 1)], &moving);
    }

    #[test]
    fn cross_column_move_postconditions(
        count in 1usize..6,
        pick in 0usize..6,
        to_index in prop::option::of(0usize..8),
    ) {
        let pick = pick % count;
        let mut store = BoardStore::new();
        for n in 0..count {
            store.insert_task("col-1", remote(u8::try_from(n).unwrap(), 0), None).unwrap();
        }
        store.insert_task("col-3", remote(9, 2), None).unwrap();
        let moving = task_id(u8::try_from(pick).unwrap());

        prop_assert!(store.relocate_task(&moving, "col-3", Some(pick), to_index).unwrap());

        let board = store.board();
        prop_assert!(!board.columns["col-1"].task_ids.contains(&moving));
        prop_assert_eq!(board.columns["col-1"].task_ids.len(), count - 1);
        prop_assert_eq!(board.columns["col-3"].task_ids.len(), 2);
        prop_assert_eq!(board.columns["col-3"].task_ids.iter().filter(|id| **id == moving).count(), 1);
        prop_assert_eq!(&board.tasks[&moving].status, "Done");
        prop_assert!(board.columns["col-2"].task_ids.is_empty());
    }

    #[test]
    fn remote_delete_and_move_are_idempotent(
        seed in prop::collection::vec((0u8..6, 0usize..3), 1..10),
        target in 0u8..6,
        status in 0usize..3,
    ) {
        let mut engine = Reconciler::new("p1", None);
        for (id, column) in &seed {
            apply(&mut engine, &Op::RemoteCreate { id: *id, status: *column });
        }

        apply(&mut engine, &Op::RemoteMove { id: target, status });
        let once = engine.board();
        apply(&mut engine, &Op::RemoteMove { id: target, status });
        prop_assert_eq!(&*once, &*engine.board());

        apply(&mut engine, &Op::RemoteDelete { id: target });
        let once = engine.board();
        apply(&mut engine, &Op::RemoteDelete { id: target });
        prop_assert_eq!(&*once, &*engine.board());
    }
}

#[test]
fn remote_update_for_unknown_task_changes_nothing() {
    let mut engine = Reconciler::new("p1", None);
    let before = engine.board();
    engine.apply_remote(&ServerEvent::TaskUpdated(TaskUpdated {
        task_id: "ghost".into(),
        updates: schema::patch_to_wire(&TaskPatch {
            title: Some("x".into()),
            ..TaskPatch::default()
        }),
        room_id: "p1".into(),
        actor_id: None,
    }));
    assert_eq!(*before, *engine.board());
}
