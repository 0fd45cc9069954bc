//! Sample times of a time-sampled channel.
//!
//! Every channel of a scene location (bound, transform, object, each
//! attribute) records the times at which it was written. Times only grow:
//! a new sample must be later than the last one, or at the same time in
//! which case it replaces it.

use crate::util::{Chrono, Error, Result};

/// Bracketing samples for a query time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleInterp {
    /// Floor sample index.
    pub floor_index: usize,
    /// Ceil sample index.
    pub ceil_index: usize,
    /// Interpolation factor (0.0 = floor, 1.0 = ceil).
    pub alpha: f64,
}

impl SampleInterp {
    /// Create for exact sample (no interpolation needed).
    pub fn exact(index: usize) -> Self {
        Self {
            floor_index: index,
            ceil_index: index,
            alpha: 0.0,
        }
    }

    /// Create for interpolation between two samples.
    pub fn lerp(floor: usize, ceil: usize, alpha: f64) -> Self {
        Self {
            floor_index: floor,
            ceil_index: ceil,
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    /// Check if this is an exact sample (no interpolation).
    pub fn is_exact(&self) -> bool {
        self.floor_index == self.ceil_index || self.alpha == 0.0
    }
}

/// Where a new sample lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplePlacement {
    /// Appended at the given index.
    Append(usize),
    /// Replaces the last sample, which was written at the same time.
    Replace(usize),
}

impl SamplePlacement {
    pub fn index(self) -> usize {
        match self {
            Self::Append(i) | Self::Replace(i) => i,
        }
    }
}

/// Validate a query or write time.
pub fn check_time(time: Chrono) -> Result<()> {
    if time.is_nan() || time < 0.0 {
        return Err(Error::invalid_arg(format!("invalid sample time {time}")));
    }
    Ok(())
}

/// Non-decreasing list of sample times.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleTimes {
    times: Vec<Chrono>,
}

impl SampleTimes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored times, checking that they are strictly increasing.
    pub fn from_vec(times: Vec<Chrono>) -> Result<Self> {
        if times.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(Error::corrupted("sample times are not increasing"));
        }
        Ok(Self { times })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn as_slice(&self) -> &[Chrono] {
        &self.times
    }

    /// Time of sample `index`.
    pub fn sample_time(&self, index: usize) -> Result<Chrono> {
        self.times
            .get(index)
            .copied()
            .ok_or(Error::SampleOutOfBounds {
                index,
                count: self.times.len(),
            })
    }

    /// Last recorded time.
    pub fn last(&self) -> Option<Chrono> {
        self.times.last().copied()
    }

    /// Decide where a sample written at `time` goes.
    pub fn placement(&self, time: Chrono) -> Result<SamplePlacement> {
        check_time(time)?;
        match self.times.last() {
            Some(&last) if time < last => Err(Error::invalid_arg(format!(
                "sample time {time} is earlier than last written time {last}"
            ))),
            Some(&last) if time == last => Ok(SamplePlacement::Replace(self.times.len() - 1)),
            _ => Ok(SamplePlacement::Append(self.times.len())),
        }
    }

    /// Record a sample written at `time`.
    pub fn push(&mut self, time: Chrono) -> Result<SamplePlacement> {
        let placement = self.placement(time)?;
        if let SamplePlacement::Append(_) = placement {
            self.times.push(time);
        }
        Ok(placement)
    }

    /// Find the samples bracketing `time`. Queries before the first sample
    /// or after the last clamp to it.
    pub fn sample_interval(&self, time: Chrono) -> Result<SampleInterp> {
        check_time(time)?;
        let n = self.times.len();
        if n == 0 {
            return Err(Error::SampleOutOfBounds { index: 0, count: 0 });
        }
        // Binary search for the first sample strictly after `time`
        let upper = self.times.partition_point(|&t| t <= time);
        if upper == 0 {
            return Ok(SampleInterp::exact(0));
        }
        let floor = upper - 1;
        if upper == n || self.times[floor] == time {
            return Ok(SampleInterp::exact(floor));
        }
        let (t0, t1) = (self.times[floor], self.times[upper]);
        Ok(SampleInterp::lerp(floor, upper, (time - t0) / (t1 - t0)))
    }

    /// Sorted union of two time lists.
    pub fn union(&self, other: &SampleTimes) -> SampleTimes {
        let mut times: Vec<Chrono> = self.times.iter().chain(&other.times).copied().collect();
        times.sort_by(|a, b| a.total_cmp(b));
        times.dedup();
        SampleTimes { times }
    }
}
