pub mod case_expression;
pub mod cycle_detector;
pub mod include_path;
pub mod include_tree;
pub mod join_compiler;
pub mod predicate;
pub mod row_assembler;

pub use case_expression::{CaseBuilder, CaseExpression, Condition, Projection};
pub use cycle_detector::CycleDetector;
pub use include_path::IncludePathValidator;
pub use include_tree::{IncludeForest, IncludeNode, IncludeTreeBuilder, NodeId, ROOT_ALIAS};
pub use join_compiler::{ColumnMapping, JoinCompilation, JoinCompiler};
pub use predicate::{FieldOp, Filter, Predicate, PredicateTranslator, SqlPredicateTranslator};
pub use row_assembler::RowAssembler;
