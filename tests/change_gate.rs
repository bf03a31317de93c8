use std::path::PathBuf;

use node_atlas::{ChangeGate, NodeId, SnapshotGate};

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "node_atlas_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

struct Case {
    root: PathBuf,
    state: PathBuf,
    input: PathBuf,
    output: PathBuf,
    node: NodeId,
}

impl Case {
    fn new(name: &str) -> Self {
        let root = temp_dir(name);
        std::fs::create_dir_all(&root).unwrap();
        let input = root.join("stone.png");
        let output = root.join("frame0000.png");
        std::fs::write(&input, b"stone v1").unwrap();
        std::fs::write(&output, b"frame").unwrap();
        Self {
            state: root.join("state"),
            root,
            input,
            output,
            node: NodeId::new("mymod", "block").unwrap(),
        }
    }

    /// Open a gate with the usual registrations applied.
    fn gate(&self) -> SnapshotGate {
        let mut gate = SnapshotGate::open(&self.state, &self.node).unwrap();
        gate.register_reference("tile.0", "stone.png", Some(&self.input));
        gate
    }

    fn commit(&self) {
        let mut gate = self.gate();
        gate.register_output(&self.output);
        gate.commit().unwrap();
    }
}

impl Drop for Case {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.root).ok();
    }
}

#[test]
fn first_open_is_modified() {
    let case = Case::new("gate_first");
    let gate = case.gate();
    assert!(!gate.has_snapshot());
    assert!(gate.is_modified());
    assert!(gate.all_tags_referenced());
    assert!(gate.all_loaded_references_used());
}

#[test]
fn committed_snapshot_is_unchanged() {
    let case = Case::new("gate_commit");
    case.commit();
    assert_eq!(
        SnapshotGate::snapshot_path(&case.state, &case.node),
        case.state.join("mymod").join("block.json")
    );

    let gate = case.gate();
    assert!(gate.has_snapshot());
    assert!(!gate.is_modified());
}

#[test]
fn edited_input_is_modified() {
    let case = Case::new("gate_input");
    case.commit();
    std::fs::write(&case.input, b"stone v2").unwrap();
    assert!(case.gate().is_modified());
}

#[test]
fn deleted_output_is_modified() {
    let case = Case::new("gate_output");
    case.commit();
    std::fs::remove_file(&case.output).unwrap();
    assert!(case.gate().is_modified());
}

#[test]
fn retagged_input_is_modified() {
    let case = Case::new("gate_tags");
    case.commit();
    let mut gate = SnapshotGate::open(&case.state, &case.node).unwrap();
    gate.register_reference("tile.1", "stone.png", Some(&case.input));
    assert!(gate.is_modified());
}

#[test]
fn unresolved_tag_and_dropped_reference_are_reported() {
    let case = Case::new("gate_consistency");
    case.commit();

    let mut gate = SnapshotGate::open(&case.state, &case.node).unwrap();
    gate.register_reference("tile.0", "gone.png", None);
    assert!(!gate.all_tags_referenced());
    assert!(!gate.all_loaded_references_used());
    assert!(gate.is_modified());
}

#[test]
fn corrupt_snapshot_is_ignored() {
    let case = Case::new("gate_corrupt");
    let path = SnapshotGate::snapshot_path(&case.state, &case.node);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"{ not json").unwrap();

    let gate = case.gate();
    assert!(!gate.has_snapshot());
    assert!(gate.is_modified());
}

#[test]
fn invalidate_forces_rebuild() {
    let case = Case::new("gate_invalidate");
    case.commit();
    assert!(SnapshotGate::invalidate(&case.state, &case.node).unwrap());
    assert!(!SnapshotGate::invalidate(&case.state, &case.node).unwrap());
    assert!(case.gate().is_modified());
}

#[test]
fn uncommitted_gate_keeps_previous_snapshot() {
    let case = Case::new("gate_uncommitted");
    case.commit();
    let before = std::fs::read(SnapshotGate::snapshot_path(&case.state, &case.node)).unwrap();

    std::fs::write(&case.input, b"stone v2").unwrap();
    let gate = case.gate();
    assert!(gate.is_modified());
    drop(gate);

    let after = std::fs::read(SnapshotGate::snapshot_path(&case.state, &case.node)).unwrap();
    assert_eq!(before, after);
}

#[test]
fn changed_setting_is_modified() {
    let case = Case::new("gate_setting");
    let mut gate = case.gate();
    gate.register_setting("render_mode", "none");
    gate.register_output(&case.output);
    gate.commit().unwrap();

    let mut same = case.gate();
    same.register_setting("render_mode", "none");
    assert!(!same.is_modified());
    assert!(same.all_tags_referenced());

    let mut changed = case.gate();
    changed.register_setting("render_mode", "glasslikeliquidlevel");
    assert!(changed.is_modified());
}
