//! mediacat: batch cataloging pipeline for scanned CD/LP images.
//!
//! The library crate wires the `mediacat-*` component crates into a running
//! pipeline; `cli` owns argument parsing and command dispatch, matching the
//! teacher's split between a thin binary and a library that does the work.

pub mod cli;
pub mod wiring;
