pub mod preprocessing;
pub mod reader;
pub mod schema;
pub mod tokenizer;
