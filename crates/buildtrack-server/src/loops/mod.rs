//! Background loops for continuous processing.

pub mod recompute_loop;
