use std::fs;
use std::path::Path;
use std::rc::Rc;

use ngcforge_core::{FileResolver, MeasurementSystem, SearchPath};
use ngcforge_features::{GenerationOptions, InsertAt, Project, ValueContext};

const DRILL_V1: &str = "[SUBROUTINE]\n\
type = drill\n\
name = Drill\n\
version = 1.0\n\
\n\
[PARAM_DEPTH]\n\
type = float\n\
value = -0.125\n\
\n\
[PARAM_RETRACT]\n\
type = float\n\
value = 0.1\n\
\n\
[CALL]\n\
content =\n\
\tG81 Z#param_depth R#param_retract\n";

const DRILL_V2: &str = "[SUBROUTINE]\n\
type = drill\n\
name = Drill\n\
version = 2.0\n\
\n\
[PARAM_DEPTH]\n\
type = float\n\
value = -0.25\n\
\n\
[PARAM_DWELL]\n\
type = float\n\
value = 0.5\n\
\n\
[CALL]\n\
content =\n\
\tG82 Z#param_depth P#param_dwell\n";

fn project(base: &Path) -> Project {
    let resolver: Rc<dyn FileResolver> = Rc::new(SearchPath::new(base).without_cwd());
    let options = GenerationOptions {
        values: ValueContext::with_units(MeasurementSystem::Imperial),
        ..GenerationOptions::default()
    };
    Project::new(resolver, options)
}

#[test]
fn test_load_upgrades_outdated_instances() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("cfg")).unwrap();
    fs::write(dir.path().join("cfg/drill.cfg"), DRILL_V1).unwrap();
    let saved = dir.path().join("part.xml");

    let mut old = project(dir.path());
    let a = old.add_feature("drill.cfg", InsertAt::End).unwrap();
    let b = old.add_feature("drill.cfg", InsertAt::End).unwrap();
    old.set_parameter(&a, "param_depth", "-0.3").unwrap();
    old.save_project(&saved).unwrap();

    fs::write(dir.path().join("cfg/drill.cfg"), DRILL_V2).unwrap();
    let mut upgraded = project(dir.path());
    let report = upgraded.load_project(&saved).unwrap();

    assert_eq!(
        report.migrated,
        vec![
            (a.clone(), "drill_003".to_string()),
            (b.clone(), "drill_004".to_string())
        ]
    );
    assert!(report.diagnostics.is_empty());

    let node = upgraded.node("drill_003").unwrap();
    let feature = upgraded.document().feature(node).unwrap();
    assert_eq!(feature.version, "2.0");
    assert_eq!(feature.get_param("param_depth").unwrap().value, "-0.3");
    assert_eq!(feature.get_param("param_dwell").unwrap().value, "0.5");
    assert!(feature.get_param("param_retract").is_none());

    let text = upgraded.generate().text;
    assert!(text.contains("G82 Z-0.300000 P0.500000"));
    assert!(text.contains("G82 Z-0.250000 P0.500000"));
    assert!(!text.contains("G81"));
}

#[test]
fn test_current_instances_load_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("cfg")).unwrap();
    fs::write(dir.path().join("cfg/drill.cfg"), DRILL_V1).unwrap();

    let mut p = project(dir.path());
    p.add_feature("drill.cfg", InsertAt::End).unwrap();
    let text = p.to_text().unwrap();

    let mut reloaded = project(dir.path());
    let report = reloaded.load_text(&text).unwrap();
    assert!(report.is_empty());
    assert!(reloaded.node("drill_001").is_ok());
    assert_eq!(reloaded.history().len(), 1);
}

#[test]
fn test_missing_template_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("cfg")).unwrap();
    fs::write(dir.path().join("cfg/drill.cfg"), DRILL_V1).unwrap();

    let mut p = project(dir.path());
    p.add_feature("drill.cfg", InsertAt::End).unwrap();
    let text = p.to_text().unwrap();
    fs::remove_file(dir.path().join("cfg/drill.cfg")).unwrap();

    let mut reloaded = project(dir.path());
    let report = reloaded.load_text(&text).unwrap();
    assert!(report.migrated.is_empty());
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].feature, "drill_001");
    assert!(reloaded.generate().text.contains("G81 Z-0.125000 R0.100000"));
}

#[test]
fn test_new_template_bounds_survive_migration() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("cfg")).unwrap();
    fs::write(dir.path().join("cfg/drill.cfg"), DRILL_V1).unwrap();
    let saved = dir.path().join("part.xml");

    let mut old = project(dir.path());
    let a = old.add_feature("drill.cfg", InsertAt::End).unwrap();
    old.set_parameter(&a, "param_depth", "-0.2").unwrap();
    old.save_project(&saved).unwrap();

    let bounded = DRILL_V2.replace(
        "value = -0.25\n",
        "value = -0.25\nminimum_value = -1\nmaximum_value = 0\n",
    );
    fs::write(dir.path().join("cfg/drill.cfg"), bounded).unwrap();
    let mut upgraded = project(dir.path());
    let report = upgraded.load_project(&saved).unwrap();
    let (_, fresh) = &report.migrated[0];

    let node = upgraded.node(fresh).unwrap();
    let depth = upgraded
        .document()
        .feature(node)
        .unwrap()
        .get_param("param_depth")
        .unwrap();
    assert_eq!(depth.value, "-0.2");
    assert_eq!(depth.minimum_value.as_deref(), Some("-1"));
    assert_eq!(depth.maximum_value.as_deref(), Some("0"));
}
