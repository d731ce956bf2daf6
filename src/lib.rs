//! Gridmind - grid-transformation pattern inference and calibrated scoring.
//!
//! Given a handful of (input, output) training grids, the engine infers
//! which transformation rule out of a fixed catalog (symmetry, rotation,
//! repetition, enclosed-zone fill, color remapping, positional/neighbor
//! conditionals) best explains the examples, applies it to unseen test
//! grids, and reports a confidence that actively penalizes overfitting.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: grids, task/solution records, and configuration
//! - `compute`: zone analysis, detectors, scoring, and the solver
//!
//! # Example
//!
//! ```rust
//! use gridmind::{
//!     compute::Solver,
//!     schema::{EngineConfig, Grid, Task, TestCase, TrainingPair},
//! };
//!
//! let task = Task {
//!     task_id: "rotation-demo".to_string(),
//!     train: vec![TrainingPair {
//!         input: Grid::from_rows(vec![vec![1, 2], vec![3, 4]]).unwrap(),
//!         output: Grid::from_rows(vec![vec![3, 1], vec![4, 2]]).unwrap(),
//!     }],
//!     test: vec![TestCase {
//!         input: Grid::from_rows(vec![vec![5, 6], vec![7, 8]]).unwrap(),
//!         output: None,
//!     }],
//! };
//!
//! let solver = Solver::new(EngineConfig::default()).unwrap();
//! let solutions = solver.solve(&task);
//! println!(
//!     "{} solved via {} with confidence {:.2}",
//!     task.task_id, solutions[0].method, solutions[0].confidence
//! );
//! ```
//!
//! The engine performs no I/O and holds no ambient state: identical tasks
//! with an identical configuration always produce identical solutions.

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{PatternKind, Solver};
pub use schema::{EngineConfig, Grid, Solution, Task};
