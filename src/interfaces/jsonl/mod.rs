//! Request scripts in, responses out, one JSON document per line.

pub mod console;
pub mod request_reader;
pub mod response_writer;
