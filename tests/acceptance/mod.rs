//! End-to-end scenarios against the simulated master.

mod common;
mod scenario_test;
mod stepper_test;
