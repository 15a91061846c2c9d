#[path = "project/migration.rs"]
mod migration;
#[path = "project/editing.rs"]
mod editing;
#[path = "project/refresh.rs"]
mod refresh;
