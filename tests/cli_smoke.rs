use std::{path::PathBuf, process::Command};

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

fn cli() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_node-atlas"));
    cmd.env_remove(node_atlas::config::CONTENT_ROOTS_ENV);
    cmd
}

#[test]
fn plan_prints_grid_layout() {
    let dir = temp_dir("cli_plan");
    std::fs::create_dir_all(&dir).unwrap();
    let nodes = dir.join("nodes.json");
    std::fs::write(
        &nodes,
        r#"{
            "mymod:block": {
                "tiles": ["a.png", "a.png", "b.png", "b.png", "c.png", "c.png"],
                "paramtype2": "facedir"
            }
        }"#,
    )
    .unwrap();

    let out = cli()
        .args(["plan", "--nodes"])
        .arg(&nodes)
        .arg("mymod:block")
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("mode:        facedir"));
    assert!(stdout.contains("grid_dim:    4"));
    assert!(stdout.contains("canvas:      64x64"));
    assert!(stdout.contains("scales:      1,2,4,8"));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn plan_rejects_unknown_mode() {
    let dir = temp_dir("cli_plan_mode");
    std::fs::create_dir_all(&dir).unwrap();
    let nodes = dir.join("nodes.json");
    std::fs::write(
        &nodes,
        r#"{"mymod:odd": {"tiles": ["a.png"], "paramtype2": "wallmounted"}}"#,
    )
    .unwrap();

    let out = cli()
        .args(["plan", "--nodes"])
        .arg(&nodes)
        .arg("mymod:odd")
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("unsupported render mode"));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn resolve_reports_found_and_missing_textures() {
    let dir = temp_dir("cli_resolve");
    let textures = dir.join("content/mymod/textures");
    std::fs::create_dir_all(&textures).unwrap();
    std::fs::write(textures.join("stone.png"), b"png").unwrap();
    let config = dir.join("atlas.json");
    std::fs::write(
        &config,
        serde_json::json!({ "content_roots": [dir.join("content")] }).to_string(),
    )
    .unwrap();

    let out = cli()
        .args(["resolve", "--config"])
        .arg(&config)
        .args(["stone.png^[colorize:red", "missing.png"])
        .output()
        .unwrap();
    assert!(!out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains(&format!(
        "stone.png\t{}",
        textures.join("stone.png").display()
    )));
    assert!(stdout.contains("missing.png\t<missing>"));

    std::fs::remove_dir_all(&dir).ok();
}
