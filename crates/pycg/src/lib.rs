#![doc = include_str!("../../../README.md")]
#![expect(clippy::too_many_arguments, reason = "pipeline constructors mirror the staged analysis API")]
#![expect(clippy::type_complexity, reason = "points-to collections are intentionally nested")]

pub mod callgraph;
pub mod classes;
pub mod constants;
pub mod definitions;
pub mod driver;
pub mod emit;
pub mod error;
pub mod imports;
pub mod modules;
pub mod output;
pub mod pointer;
pub mod postprocess;
pub mod preprocess;
pub mod scope;
pub mod shared;

pub use crate::{
    callgraph::CallGraph,
    constants::Namespace,
    driver::{AnalysisOptions, AnalysisResult, run_analysis},
    error::PycgError,
};
