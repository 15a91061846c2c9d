//! Link to the running machine controller
//!
//! The compiler only needs to know whether the controller is idle and to hand it
//! a freshly written program file.

use std::path::Path;

use crate::error::Result;

pub trait ControllerLink {
    /// True when no program is running
    fn is_idle(&self) -> bool;

    /// Load the program file into the controller
    fn open_program(&mut self, path: &Path) -> Result<()>;
}

/// Link used when no controller is attached; never opens anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl ControllerLink for Detached {
    fn is_idle(&self) -> bool {
        false
    }

    fn open_program(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }
}
