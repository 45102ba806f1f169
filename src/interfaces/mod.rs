//! Inbound and outbound file formats.

pub mod csv;
pub mod jsonl;
