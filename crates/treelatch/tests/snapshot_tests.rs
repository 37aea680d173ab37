//! Tree state snapshots

use pretty_assertions::assert_eq;
use treelatch::*;

fn small() -> LockController {
    LockController::build(&["Root", "Child1", "Child2", "GC1", "GC2"], &[-1, 0, 0, 1, 1]).unwrap()
}

fn node(
    id: NodeId,
    name: &str,
    locked_by: Option<UserId>,
    count: usize,
    children: Vec<NodeSnapshot>,
) -> NodeSnapshot {
    NodeSnapshot {
        id,
        name: name.to_string(),
        locked_by,
        locked_descendant_count: count,
        children,
    }
}

#[test]
fn test_state_reflects_locks() {
    let locks = small();
    locks.lock(3, 1).unwrap();
    locks.lock(2, 2).unwrap();

    let expected = node(
        0,
        "Root",
        None,
        2,
        vec![
            node(
                1,
                "Child1",
                None,
                1,
                vec![node(3, "GC1", Some(1), 0, vec![]), node(4, "GC2", None, 0, vec![])],
            ),
            node(2, "Child2", Some(2), 0, vec![]),
        ],
    );
    assert_eq!(locks.tree_state(), expected);
}

#[test]
fn test_state_after_upgrade() {
    let locks = small();
    locks.lock(3, 1).unwrap();
    locks.lock(4, 1).unwrap();
    locks.upgrade_lock(1, 1).unwrap();

    let state = locks.tree_state();
    assert_eq!(state.locked_nodes(), vec![1]);
    assert_eq!(state.find(1).map(|n| n.locked_descendant_count), Some(0));
    assert_eq!(state.locked_descendant_count, 1);
}

#[test]
fn test_snapshot_is_detached_copy() {
    let locks = small();
    let before = locks.tree_state();
    locks.lock(1, 4).unwrap();

    assert!(before.locked_nodes().is_empty());
    assert_eq!(locks.tree_state().locked_nodes(), vec![1]);
}

#[test]
fn test_display_outline() {
    let locks = small();
    locks.lock(3, 1).unwrap();

    let expected = "\
Root (ID: 0) [1 locked descendants]
  Child1 (ID: 1) [1 locked descendants]
    GC1 (ID: 3) [LOCKED by User 1]
    GC2 (ID: 4)
  Child2 (ID: 2)
";
    assert_eq!(locks.tree_state().to_string(), expected);
}

#[test]
fn test_json_shape() -> anyhow::Result<()> {
    let locks = small();
    locks.lock(2, 9).unwrap();

    let json: serde_json::Value = serde_json::from_str(&locks.tree_state().to_json()?)?;
    assert_eq!(json["name"], "Root");
    assert_eq!(json["lockedBy"], serde_json::Value::Null);
    assert_eq!(json["lockedDescendantCount"], 1);
    assert_eq!(json["children"][1]["lockedBy"], 9);
    assert_eq!(json["children"][0]["children"][1]["id"], 4);

    assert!(locks.tree_state().to_json_pretty()?.contains('\n'));
    Ok(())
}

fn chain(depth: usize) -> LockController {
    let names: Vec<String> = (0..depth).map(|i| format!("n{}", i)).collect();
    let parents: Vec<i64> = (0..depth as i64).map(|i| i - 1).collect();
    LockController::build(&names, &parents).unwrap()
}

#[test]
fn test_deep_chain_snapshot() {
    let depth = 200_000;
    let locks = chain(depth);

    locks.lock(depth - 1, 1).unwrap();
    locks.verify().unwrap();

    let state = locks.tree_state();
    assert_eq!(state.len(), depth);
    assert_eq!(state.locked_descendant_count, 1);
    assert_eq!(state.locked_nodes(), vec![depth - 1]);

    let copy = state.clone();
    assert!(copy == state);
    drop(copy);
    drop(state);
}

#[test]
fn test_deep_chain_outline() {
    // Indentation grows with depth, so the outline is quadratic in size.
    let depth = 10_000;
    let locks = chain(depth);
    locks.lock(depth - 1, 1).unwrap();

    let outline = locks.tree_state().to_string();
    assert_eq!(outline.lines().count(), depth);
    assert!(outline.starts_with("n0 (ID: 0) [1 locked descendants]\n  n1 (ID: 1)"));
    assert!(outline
        .lines()
        .last()
        .is_some_and(|line| line.ends_with("n9999 (ID: 9999) [LOCKED by User 1]")));
}
