// In: src/pipeline/driver.rs

//! The pipeline driver: one loop alternating submission and draining.
//!
//! The driver knows nothing about buffers, framing or the device. It asks its
//! `PipelineStrategy` three questions each iteration (is there input left, how
//! many slots are free, how deep is the pipeline) and then takes exactly one step.
//! Submitting is preferred over draining, so the device is kept as full as the
//! pool allows; draining happens only when the pool is saturated or the input is
//! exhausted. The loop ends when there is no input left and nothing in flight.

use crate::error::ZipqError;

/// The two productive actions of a pipeline, plus the bookkeeping the driver
/// needs to choose between them.
pub trait PipelineStrategy {
    /// True while source bytes remain to be submitted.
    fn input_remaining(&self) -> bool;

    /// Free slots, i.e. `N - in_flight`.
    fn slots_available(&self) -> usize;

    /// N, the maximum number of units in flight.
    fn pipeline_depth(&self) -> usize;

    /// Fills one free slot from the source and hands it to the device.
    fn submit_next(&mut self) -> Result<(), ZipqError>;

    /// Waits for the oldest in-flight unit and writes its output to the sink.
    fn drain_next(&mut self) -> Result<(), ZipqError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Submit,
    Drain,
    Done,
}

/// The scheduling rule.
pub fn next_step<S: PipelineStrategy + ?Sized>(strategy: &S) -> Step {
    let available = strategy.slots_available();
    if strategy.input_remaining() && available > 0 {
        Step::Submit
    } else if available < strategy.pipeline_depth() {
        Step::Drain
    } else {
        Step::Done
    }
}

/// Step counts for one completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverReport {
    pub submits: u64,
    pub drains: u64,
}

/// Drives `strategy` to completion. The first error aborts the run.
pub fn run<S: PipelineStrategy + ?Sized>(strategy: &mut S) -> Result<DriverReport, ZipqError> {
    let depth = strategy.pipeline_depth();
    if depth == 0 {
        return Err(ZipqError::InternalError("pipeline depth of zero".into()));
    }

    let mut report = DriverReport::default();
    loop {
        if strategy.slots_available() > depth {
            return Err(ZipqError::InternalError(format!(
                "{} slots available in a pipeline of depth {}",
                strategy.slots_available(),
                depth
            )));
        }
        match next_step(strategy) {
            Step::Submit => {
                strategy.submit_next()?;
                report.submits += 1;
            }
            Step::Drain => {
                strategy.drain_next()?;
                report.drains += 1;
            }
            Step::Done => break,
        }
    }
    Ok(report)
}
