// 表达式求值模块

mod resolver;
mod schema;

pub use resolver::{
    lookup_path, resolve, resolve_optional, resolve_tokens, ContextLookup, ResolvedInput,
};
pub use schema::{Expression, Token, ValueSchema};
