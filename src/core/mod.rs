//! Core layer - addressing and fundamental value types.
//!
//! This module provides:
//! - [`Path`] and the path codec ([`path_to_string`], [`string_to_path`])
//! - [`PathMatcher`] - Prefix tree of paths returned by set queries
//! - [`Value`] - Typed data stored at scene locations
//! - [`SampleTimes`] - Append-only sample times with interval lookup

mod path;
mod path_matcher;
mod sample_times;
mod value;

pub use path::{
    is_prefix, path_to_string, root_name, string_to_path, string_to_path_checked, Path, ROOT,
};
pub use path_matcher::{MatchResult, MatcherEntry, PathMatcher};
pub use sample_times::{check_time, SampleInterp, SamplePlacement, SampleTimes};
pub use value::{Value, ValueType};
