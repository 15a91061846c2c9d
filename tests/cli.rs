use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use ngcforge::open_project;
use ngcforge_features::InsertAt;
use ngcforge_settings::Config;

const DRILL: &str = "[SUBROUTINE]\ntype = drill\nname = Drill\n\n\
[PARAM_DEPTH]\ntype = float\nvalue = -0.5\n\n[CALL]\ncontent =\n\tG81 Z#param_depth\n";

/// Base dir with one template, a config pointing at it and a saved project
fn workspace(base: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    fs::create_dir_all(base.join("cfg")).unwrap();
    fs::write(base.join("cfg/drill.cfg"), DRILL).unwrap();
    let config_path = base.join("config.toml");
    fs::write(&config_path, format!("[paths]\nbase_dir = {:?}\n", base)).unwrap();

    let config = Config::load_from_file(&config_path).unwrap();
    let mut project = open_project(&config).unwrap();
    project.add_feature("drill.cfg", InsertAt::End).unwrap();
    let project_path = base.join("part.xml");
    project.save_project(&project_path).unwrap();
    (config_path, project_path)
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ngcforge"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_tree_stdout_holds_only_the_listing() {
    let dir = tempfile::tempdir().unwrap();
    let (config, project) = workspace(dir.path());
    let out = run(&[
        "--config",
        config.to_str().unwrap(),
        "tree",
        project.to_str().unwrap(),
    ]);
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("Drill (drill_001)"));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Loaded project"));
}

#[test]
fn test_generate_json_is_parseable() {
    let dir = tempfile::tempdir().unwrap();
    let (config, project) = workspace(dir.path());
    let output = dir.path().join("out.ngc");
    let out = run(&[
        "--config",
        config.to_str().unwrap(),
        "generate",
        project.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "--json",
    ]);
    assert!(out.status.success());

    let diagnostics: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(diagnostics, serde_json::json!([]));
    assert!(fs::read_to_string(&output).unwrap().contains("G81 Z"));
}
