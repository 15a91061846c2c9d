use ngcforge_core::{ToolLookup, ToolTable};
use std::fs;

#[test]
fn test_load_tool_table_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tool.tbl");
    fs::write(
        &path,
        "T3 P3 D0.5 Z0 ;half inch\nT7 P7 D3 Q2 ;lathe bit\n",
    )
    .unwrap();

    let table = ToolTable::load(&path).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.display_text("7"), "7 - lathe bit");
    assert_eq!(table.orientation(7), 2);
}

#[test]
fn test_load_missing_table_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ToolTable::load(&dir.path().join("missing.tbl")).unwrap_err();
    assert!(err.is_io_error());
}
