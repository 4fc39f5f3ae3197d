//! Use cases - User story orchestration.

pub mod gm;
