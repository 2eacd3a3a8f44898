//! Rule-driven lead and task automation for education consultancy CRMs.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
