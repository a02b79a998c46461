//! Files written at the end of a run.
//!
//! - [`json`]: the [`RunReport`](crate::models::RunReport) as a JSON document
//!
//! ```text
//! json_output_dir/
//! └── 2025-06-10/
//!     ├── news-071502.json
//!     └── news-190944.json
//! ```

pub mod json;
