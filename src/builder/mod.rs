//! Builder - coin selection and transaction assembly.

pub mod assembler;
pub mod selection;

pub use assembler::TransactionAssembler;
pub use selection::{select, Selection};
