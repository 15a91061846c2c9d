use std::fs;
use std::path::Path;
use std::rc::Rc;

use ngcforge_core::{FileResolver, SearchPath};
use ngcforge_features::{Direction, GenerationOptions, InsertAt, Project};

const GROUP: &str = "[SUBROUTINE]\ntype = group\nname = Group\n\n[PARAM_ITEMS]\ntype = items\n";
const DRILL: &str = "[SUBROUTINE]\ntype = drill\nname = Drill\n\n\
[PARAM_DEPTH]\ntype = float\nvalue = -1\n\n[CALL]\ncontent =\n\tG81 Z#param_depth\n";

fn setup() -> (tempfile::TempDir, Project) {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("cfg")).unwrap();
    fs::write(dir.path().join("cfg/group.cfg"), GROUP).unwrap();
    fs::write(dir.path().join("cfg/drill.cfg"), DRILL).unwrap();
    let project = open(dir.path());
    (dir, project)
}

fn open(base: &Path) -> Project {
    let resolver: Rc<dyn FileResolver> = Rc::new(SearchPath::new(base).without_cwd());
    Project::new(resolver, GenerationOptions::default())
}

fn root_ids(p: &Project) -> Vec<String> {
    let doc = p.document();
    doc.roots()
        .iter()
        .map(|&n| doc.feature(n).unwrap().id.clone())
        .collect()
}

fn child_ids(p: &Project, id: &str) -> Vec<String> {
    let doc = p.document();
    doc.children(p.node(id).unwrap())
        .into_iter()
        .map(|n| doc.feature(n).unwrap().id.clone())
        .collect()
}

#[test]
fn test_nesting_edits() {
    let (_dir, mut p) = setup();
    let g = p.add_feature("group.cfg", InsertAt::End).unwrap();
    let d1 = p.add_feature("drill.cfg", InsertAt::End).unwrap();
    let d2 = p.add_feature("drill.cfg", InsertAt::End).unwrap();
    assert_eq!(root_ids(&p), vec![g.as_str(), d1.as_str(), d2.as_str()]);

    assert!(p.move_feature(&d1, Direction::Up).unwrap());
    assert!(!p.move_feature(&d1, Direction::Up).unwrap());
    assert_eq!(root_ids(&p), vec![d1.as_str(), g.as_str(), d2.as_str()]);

    assert!(p.append_to_items(&d1, &g).unwrap());
    assert!(p.append_to_items(&d2, &g).unwrap());
    assert_eq!(root_ids(&p), vec![g.clone()]);
    assert_eq!(child_ids(&p, &g), vec![d1.clone(), d2.clone()]);
    assert!(!p.append_to_items(&g, &d1).unwrap());

    assert!(p.remove_from_items(&d1).unwrap());
    assert!(!p.remove_from_items(&d1).unwrap());
    assert_eq!(root_ids(&p), vec![d1.clone(), g.clone()]);
    assert_eq!(child_ids(&p, &g), vec![d2.clone()]);

    assert!(p.undo().unwrap());
    assert_eq!(root_ids(&p), vec![g.clone()]);
    assert_eq!(child_ids(&p, &g), vec![d1, d2]);
}

#[test]
fn test_remove_takes_subtree() {
    let (_dir, mut p) = setup();
    let g = p.add_feature("group.cfg", InsertAt::End).unwrap();
    let group = p.node(&g).unwrap();
    let d = p.add_feature("drill.cfg", InsertAt::Into(group)).unwrap();
    assert_eq!(child_ids(&p, &g), vec![d.clone()]);

    p.remove_feature(&g).unwrap();
    assert!(p.document().is_empty());
    assert!(p.node(&d).is_err());
    assert!(p.undo().unwrap());
    assert_eq!(child_ids(&p, &g), vec![d]);
}

#[test]
fn test_view_hints_round_trip_through_file() {
    let (dir, mut p) = setup();
    let g = p.add_feature("group.cfg", InsertAt::End).unwrap();
    let group = p.node(&g).unwrap();
    p.add_feature("drill.cfg", InsertAt::Into(group)).unwrap();
    p.ui_mut().expanded.insert("0".to_string());
    p.ui_mut().selected = Some("0:0:0".to_string());

    let path = dir.path().join("nested.xml");
    p.save_project(&path).unwrap();
    assert_eq!(p.path(), Some(path.as_path()));

    let mut reopened = open(dir.path());
    reopened.load_project(&path).unwrap();
    assert!(reopened.ui().expanded.contains("0"));
    assert_eq!(reopened.ui().selected.as_deref(), Some("0:0:0"));
    assert_eq!(reopened.generate().text, p.generate().text);
}

#[test]
fn test_first_edit_undoes_to_empty_project() {
    let (_dir, mut p) = setup();
    assert_eq!(p.history().len(), 1);
    let d = p.add_feature("drill.cfg", InsertAt::End).unwrap();

    assert!(p.undo().unwrap());
    assert!(p.document().is_empty());
    assert!(!p.undo().unwrap());
    assert!(p.redo().unwrap());
    assert_eq!(root_ids(&p), vec![d]);
}
