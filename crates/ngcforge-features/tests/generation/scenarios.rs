use ngcforge_core::{MeasurementSystem, SearchPath};
use ngcforge_features::{
    to_gcode, DiagnosticKind, Document, FeatureTemplate, GenerationOptions, InsertAt, ValueContext,
};

const DRILL: &str = "[SUBROUTINE]\n\
type = drill\n\
name = Drill\n\
\n\
[PARAM_DEPTH]\n\
type = float\n\
value = -0.5\n\
\n\
[PARAM_FEED]\n\
type = float\n\
value = 12\n\
\n\
[CALL]\n\
content =\n\
\t(drill #self_id)\n\
\tF#param_feed\n\
\tG81 X0 Y0 Z#param_depth R0.1\n\
\tG80\n";

const CIRCLE: &str = "[SUBROUTINE]\n\
type = circle\n\
name = Circle\n\
\n\
[PARAM_RADIUS]\n\
type = float\n\
value = 0.25\n\
\n\
[DEFINITIONS]\n\
content =\n\
\to<circle> sub\n\
\tG2 I#1\n\
\to<circle> endsub\n\
\n\
[CALL]\n\
content =\n\
\to<circle> call [#param_radius]\n";

const GROUP: &str = "[SUBROUTINE]\n\
type = group\n\
name = Group\n\
indent = 1\n\
\n\
[PARAM_ITEMS]\n\
type = items\n\
\n\
[BEFORE]\n\
content =\n\
\t(group start)\n\
\n\
[AFTER]\n\
content =\n\
\t(group end)\n";

const CHECKED: &str = "[SUBROUTINE]\n\
type = pocket\n\
name = Pocket\n\
\n\
[PARAM_DEPTH]\n\
type = float\n\
value = 0.1\n\
\n\
[VALIDATION]\n\
content =\n\
\t#param_depth < 0 :: Pocket depth must be negative\n\
\n\
[CALL]\n\
content =\n\
\t(pocket)\n\
\t<import>missing_part.ngc</import>\n";

fn imperial() -> GenerationOptions {
    GenerationOptions {
        values: ValueContext::with_units(MeasurementSystem::Imperial),
        ..GenerationOptions::default()
    }
}

fn template(name: &str, text: &str) -> FeatureTemplate {
    FeatureTemplate::parse(name, text).unwrap()
}

#[test]
fn test_changing_depth_changes_only_its_literal() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = SearchPath::new(dir.path()).without_cwd();
    let options = imperial();
    let drill = template("drill.cfg", DRILL);

    let mut doc = Document::new();
    let node = doc.add_instance(&drill, InsertAt::End, &options.values);
    let before = to_gcode(&mut doc, &options, &resolver).text;
    assert!(before.contains("G81 X0 Y0 Z-0.500000 R0.1"));
    assert!(before.contains("F12.000000"));

    let changed = doc
        .feature_mut(node)
        .unwrap()
        .set_param_value("param_depth", "-0.75", &options.values)
        .unwrap();
    assert!(changed);
    let after = to_gcode(&mut doc, &options, &resolver).text;

    assert_eq!(after, before.replace("-0.500000", "-0.750000"));
    assert_ne!(after, before);
}

#[test]
fn test_definitions_emitted_once_across_nesting() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = SearchPath::new(dir.path()).without_cwd();
    let options = imperial();
    let circle = template("circle.cfg", CIRCLE);
    let group = template("group.cfg", GROUP);

    let mut doc = Document::new();
    doc.add_instance(&circle, InsertAt::End, &options.values);
    let g = doc.add_instance(&group, InsertAt::End, &options.values);
    doc.add_instance(&circle, InsertAt::Into(g), &options.values);
    doc.add_instance(&circle, InsertAt::End, &options.values);

    let text = to_gcode(&mut doc, &options, &resolver).text;
    assert_eq!(text.matches("o<circle> sub").count(), 1);
    assert_eq!(text.matches("o<circle> call [0.250000]").count(), 3);

    let defs_end = text.find("(end sub definitions)").unwrap();
    assert!(text.find("o<circle> endsub").unwrap() < defs_end);
    assert!(text.find("o<circle> call").unwrap() > defs_end);
    assert!(text.contains("\n\t\to<circle> call [0.250000]\n"));
}

#[test]
fn test_failures_become_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = SearchPath::new(dir.path()).without_cwd();
    let options = imperial();
    let pocket = template("pocket.cfg", CHECKED);

    let mut doc = Document::new();
    doc.add_instance(&pocket, InsertAt::End, &options.values);
    let program = to_gcode(&mut doc, &options, &resolver);

    assert!(program.text.contains("(pocket)"));
    assert!(program.text.ends_with("\nM2\n"));
    let kinds: Vec<DiagnosticKind> = program.diagnostics.iter().map(|d| d.kind).collect();
    assert!(kinds.contains(&DiagnosticKind::Validation));
    assert!(kinds.contains(&DiagnosticKind::Resolution));
    assert!(program
        .diagnostics
        .iter()
        .any(|d| d.message.contains("Pocket depth must be negative")));
    assert!(program.diagnostics.iter().all(|d| d.feature == "pocket_001"));
}

#[test]
fn test_import_reads_project_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("projects")).unwrap();
    std::fs::write(dir.path().join("projects/missing_part.ngc"), "G0 Z1").unwrap();
    let resolver = SearchPath::new(dir.path()).without_cwd();
    let options = imperial();
    let pocket = template("pocket.cfg", CHECKED);

    let mut doc = Document::new();
    doc.add_instance(&pocket, InsertAt::End, &options.values);
    let program = to_gcode(&mut doc, &options, &resolver);

    assert!(program.text.contains("G0 Z1"));
    assert!(program
        .diagnostics
        .iter()
        .all(|d| d.kind == DiagnosticKind::Validation));
}
