pub mod job;
pub mod job_table;
pub mod parser;
pub mod resolver;
