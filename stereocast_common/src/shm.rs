//! Shared memory channel definitions.
//!
//! This module contains:
//! - `consts`: segment field names, naming limits and polling intervals.
//! - `policy`: the write admission policy shared by publisher and configuration.

pub mod consts;
pub mod policy;
