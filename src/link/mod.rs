//! Vehicle controller link payloads

pub mod frame;
