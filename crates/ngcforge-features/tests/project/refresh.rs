use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use ngcforge_core::{ControllerLink, Detached, FileResolver, Result, SearchPath};
use ngcforge_features::{AutoRefresh, GenerationOptions, InsertAt, Project};

const LINE: &str = "[SUBROUTINE]\ntype = line\nname = Line\n\n\
[PARAM_X]\ntype = float\nvalue = 2\n\n[CALL]\ncontent =\n\tG1 X#param_x\n";

const STEP: Duration = Duration::from_millis(300);

#[derive(Default)]
struct RecordingController {
    busy: bool,
    opened: Vec<PathBuf>,
}

impl ControllerLink for RecordingController {
    fn is_idle(&self) -> bool {
        !self.busy
    }

    fn open_program(&mut self, path: &Path) -> Result<()> {
        self.opened.push(path.to_path_buf());
        Ok(())
    }
}

fn project(base: &Path) -> Project {
    fs::create_dir_all(base.join("cfg")).unwrap();
    fs::write(base.join("cfg/line.cfg"), LINE).unwrap();
    let resolver: Rc<dyn FileResolver> = Rc::new(SearchPath::new(base).without_cwd());
    Project::new(resolver, GenerationOptions::default())
}

#[test]
fn test_edit_burst_writes_once_and_opens_program() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = project(dir.path());
    let output = dir.path().join("ncam.ngc");
    let mut refresh = AutoRefresh::new(&output, STEP, RecordingController::default());

    let t0 = Instant::now();
    let id = p.add_feature("line.cfg", InsertAt::End).unwrap();
    refresh.changed(t0);
    p.set_parameter(&id, "param_x", "3").unwrap();
    refresh.changed(t0 + Duration::from_millis(100));

    assert!(refresh.tick(&mut p, t0 + STEP).unwrap().is_none());
    assert!(!output.exists());

    let program = refresh.tick(&mut p, t0 + STEP * 2).unwrap().unwrap();
    assert!(program.text.contains("G1 X3.000000"));
    assert_eq!(fs::read_to_string(&output).unwrap(), program.text);
    assert_eq!(refresh.controller().opened, vec![output.clone()]);
    assert!(refresh.tick(&mut p, t0 + STEP * 4).unwrap().is_none());
}

#[test]
fn test_busy_controller_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = project(dir.path());
    p.add_feature("line.cfg", InsertAt::End).unwrap();
    let output = dir.path().join("ncam.ngc");
    let busy = RecordingController {
        busy: true,
        ..RecordingController::default()
    };
    let mut refresh = AutoRefresh::new(&output, STEP, busy);

    refresh.refresh_now(&mut p).unwrap();
    assert!(output.exists());
    assert!(refresh.controller().opened.is_empty());
}

#[test]
fn test_disabled_refresh_ignores_edits() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = project(dir.path());
    let mut refresh = AutoRefresh::new(dir.path().join("ncam.ngc"), STEP, Detached);
    refresh.set_enabled(false);

    let t0 = Instant::now();
    p.add_feature("line.cfg", InsertAt::End).unwrap();
    refresh.changed(t0);
    assert!(!refresh.scheduler().is_pending());
    assert!(refresh.tick(&mut p, t0 + STEP * 2).unwrap().is_none());
}
