//! End-to-end library flow: store rows replayed into the index, observed
//! by the layout engine and the sorter, then persisted back.

use std::cell::RefCell;
use std::rc::Rc;

use tempfile::TempDir;

use taskboard::config::LayoutConfig;
use taskboard::index::TaskIndex;
use taskboard::layout::GraphLayout;
use taskboard::sorter::TaskSorter;
use taskboard::store::{Store, DATA_DIR};
use taskboard::task::{Task, TaskPatch};

fn seeded_store() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = Store::new(dir.path().join(DATA_DIR), 60);
    (dir, store)
}

fn load_index(store: &Store) -> TaskIndex {
    let index = TaskIndex::new();
    for row in store.list_tasks().unwrap() {
        index.add_task(Task::from(&row));
    }
    index
}

#[test]
fn store_rows_replay_into_a_consistent_index() {
    let (_dir, store) = seeded_store();

    let root = store.create_task(None).unwrap();
    let child = store.create_task(Some(root.id)).unwrap();
    store.update_hours(child.id, 2.0, 3.0).unwrap();

    let index = load_index(&store);

    assert_eq!(index.len(), 2);
    assert_eq!(index.children(root.id), vec![child.id]);
    assert_eq!(index.hr_completed_total(root.id), 2.0);
    assert_eq!(index.hr_remaining_total(root.id), 3.0);
    // The creation snapshot coalesced away, so the child's estimate is the
    // first surviving snapshot's total.
    assert_eq!(index.hr_estimate_total_original(root.id), 5.0);
    assert!(index.visible(child.id));
}

#[test]
fn layout_positions_survive_a_store_round_trip() {
    let (_dir, store) = seeded_store();

    let root = store.create_task(None).unwrap();
    let child = store.create_task(Some(root.id)).unwrap();

    let index = load_index(&store);
    let layout = GraphLayout::new(&index, LayoutConfig::default());
    layout.set_node_height(root.id, 100.0);
    layout.set_node_height(child.id, 100.0);
    layout.flush();

    let positions: Vec<(i64, f64, f64)> = layout
        .flow_nodes()
        .iter()
        .map(|node| (node.data.id, node.position.x, node.position.y))
        .collect();
    store.save_positions(&positions).unwrap();

    let rows = store.list_tasks().unwrap();
    let child_row = rows.iter().find(|row| row.id == child.id).unwrap();
    assert!(child_row.pos_x > 0.0);

    // A fresh replay carries the persisted position.
    let reloaded = load_index(&store);
    assert_eq!(
        reloaded.get(child.id).unwrap().borrow().pos.x,
        child_row.pos_x
    );
}

#[test]
fn index_mutations_drive_layout_and_sorter_together() {
    let index = TaskIndex::new();
    index.add_task(Task::with_id(1).with_hours(0.0, 2.0));
    index.add_task(Task::with_id(2).with_parent(Some(1)).with_hours(0.0, 1.0));

    let layout = GraphLayout::new(&index, LayoutConfig::default());
    layout.set_node_height(1, 100.0);
    layout.set_node_height(2, 100.0);

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Lane {
        Open,
        Done,
    }
    let sorter = TaskSorter::new(
        &index,
        |_, _| true,
        |index, id| {
            if index.done(id) {
                Some(Lane::Done)
            } else {
                Some(Lane::Open)
            }
        },
    );

    let transitions = Rc::new(RefCell::new(Vec::new()));
    let transitions_clone = Rc::clone(&transitions);
    sorter
        .on_bucket_change(move |id, old, new| {
            transitions_clone
                .borrow_mut()
                .push((id, old.copied(), new.copied()));
        })
        .forget();

    layout.flush();
    assert_eq!(layout.node_count(), 2);
    assert_eq!(sorter.members(&Lane::Open), vec![1, 2]);

    // Finishing the subtree flips the whole chain to done and schedules
    // exactly one more layout pass.
    index.set_own_hours(2, 1.0, 0.0).unwrap();
    index.set_own_hours(1, 1.0, 0.0).unwrap();

    assert!(layout.needs_layout());
    assert!(layout.flush());
    assert!(!layout.flush());

    assert_eq!(sorter.members(&Lane::Done), vec![1, 2]);
    assert!(transitions
        .borrow()
        .contains(&(1, Some(Lane::Open), Some(Lane::Done))));
    assert!(transitions
        .borrow()
        .contains(&(2, Some(Lane::Open), Some(Lane::Done))));
}

#[test]
fn trashing_in_the_index_empties_dependent_views() {
    let index = TaskIndex::new();
    index.add_task(Task::with_id(1).with_hours(0.0, 1.0));
    index.add_task(Task::with_id(2).with_parent(Some(1)).with_hours(0.0, 1.0));

    let layout = GraphLayout::new(&index, LayoutConfig::default());
    let sorter: TaskSorter<&'static str> =
        TaskSorter::new(&index, |_, _| true, |_, _| Some("open"));
    layout.flush();
    assert_eq!(layout.node_count(), 2);
    assert_eq!(sorter.members(&"open"), vec![1, 2]);

    index
        .apply(
            1,
            &TaskPatch {
                trashed: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
    layout.flush();

    assert_eq!(layout.node_count(), 0);
    assert_eq!(sorter.bucket_of(1), None);
    // The child is invisible through its ancestor; the sorter evicts it
    // without any mutation of the child itself.
    assert_eq!(sorter.bucket_of(2), None);
    assert!(sorter.members(&"open").is_empty());
}
