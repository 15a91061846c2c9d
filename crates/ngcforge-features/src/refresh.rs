//! Debounced regeneration
//!
//! The front end calls [`RefreshScheduler::request`] after each committed edit
//! and [`RefreshScheduler::poll`] from its timer. Bursts of edits collapse
//! into one run, and runs are never closer together than the interval.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ngcforge_core::{ControllerLink, Result};
use tracing::{debug, info};

use crate::codegen::GeneratedProgram;
use crate::project::Project;

/// Handed out by `poll`; identifies the request a run serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    generation: u64,
}

#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    interval: Duration,
    deadline: Option<Instant>,
    last_run: Option<Instant>,
    generation: u64,
    in_flight: Option<RefreshTicket>,
}

impl RefreshScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
            last_run: None,
            generation: 0,
            in_flight: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arm (or re-arm) the deadline one interval from `now`
    pub fn request(&mut self, now: Instant) {
        self.generation += 1;
        self.deadline = Some(now + self.interval);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start a run if the deadline has passed
    pub fn poll(&mut self, now: Instant) -> Option<RefreshTicket> {
        let deadline = self.deadline?;
        if now < deadline || self.in_flight.is_some() {
            return None;
        }
        if self
            .last_run
            .is_some_and(|last| now.duration_since(last) < self.interval)
        {
            return None;
        }
        self.deadline = None;
        self.last_run = Some(now);
        let ticket = RefreshTicket {
            generation: self.generation,
        };
        self.in_flight = Some(ticket);
        Some(ticket)
    }

    /// End a run; false when a newer request superseded it
    pub fn finish(&mut self, ticket: RefreshTicket) -> bool {
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        }
        ticket.generation == self.generation
    }
}

/// Writes the program after edits and hands it to an idle controller
pub struct AutoRefresh<C: ControllerLink> {
    scheduler: RefreshScheduler,
    output: PathBuf,
    controller: C,
    enabled: bool,
}

impl<C: ControllerLink> AutoRefresh<C> {
    pub fn new(output: impl Into<PathBuf>, interval: Duration, controller: C) -> Self {
        Self {
            scheduler: RefreshScheduler::new(interval),
            output: output.into(),
            controller,
            enabled: true,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    /// Note a committed edit
    pub fn changed(&mut self, now: Instant) {
        if self.enabled {
            self.scheduler.request(now);
        }
    }

    /// Timer callback; returns the program when a run happened
    pub fn tick(&mut self, project: &mut Project, now: Instant) -> Result<Option<GeneratedProgram>> {
        let Some(ticket) = self.scheduler.poll(now) else {
            return Ok(None);
        };
        let result = project.write_ngc(&self.output);
        let current = self.scheduler.finish(ticket);
        let program = result?;
        if !current {
            debug!("Refresh superseded, waiting for the next one");
            return Ok(None);
        }
        self.push()?;
        Ok(Some(program))
    }

    /// Regenerate immediately, bypassing the timer
    pub fn refresh_now(&mut self, project: &mut Project) -> Result<GeneratedProgram> {
        let program = project.write_ngc(&self.output)?;
        self.push()?;
        Ok(program)
    }

    fn push(&mut self) -> Result<()> {
        if self.controller.is_idle() {
            info!("Opening {} in the controller", self.output.display());
            self.controller.open_program(&self.output)?;
        } else {
            debug!("Controller busy, {} not reopened", self.output.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: Duration = Duration::from_millis(300);

    #[test]
    fn test_burst_coalesces() {
        let mut s = RefreshScheduler::new(STEP);
        let t0 = Instant::now();
        s.request(t0);
        s.request(t0 + Duration::from_millis(100));
        s.request(t0 + Duration::from_millis(200));
        assert_eq!(s.poll(t0 + Duration::from_millis(400)), None);
        let ticket = s.poll(t0 + Duration::from_millis(500)).unwrap();
        assert!(s.finish(ticket));
        assert_eq!(s.poll(t0 + Duration::from_millis(900)), None);
    }

    #[test]
    fn test_request_during_run_supersedes() {
        let mut s = RefreshScheduler::new(STEP);
        let t0 = Instant::now();
        s.request(t0);
        let ticket = s.poll(t0 + STEP).unwrap();
        s.request(t0 + STEP);
        assert!(s.is_running());
        assert_eq!(s.poll(t0 + STEP * 3), None);
        assert!(!s.finish(ticket));
        assert!(s.poll(t0 + STEP * 3).is_some());
    }

    #[test]
    fn test_min_spacing_between_runs() {
        let mut s = RefreshScheduler::new(Duration::from_millis(300));
        let t0 = Instant::now();
        s.request(t0);
        let first = s.poll(t0 + STEP).unwrap();
        s.finish(first);
        s.request(t0 + STEP);
        // armed deadline passed but the previous run was too recent
        s.deadline = Some(t0 + STEP);
        assert_eq!(s.poll(t0 + STEP + Duration::from_millis(100)), None);
        assert!(s.poll(t0 + STEP * 2).is_some());
    }
}
