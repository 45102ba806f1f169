use crate::error::{ErrorCode, Result, VendingError};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Ok { line: usize, body: Value },
    Error { line: usize, error: ErrorBody },
}

impl Response {
    pub fn from_result(line: usize, result: Result<Value>) -> Self {
        match result {
            Ok(body) => Response::Ok { line, body },
            Err(err) => Response::Error {
                line,
                error: ErrorBody {
                    code: err.code(),
                    message: err.public_message(),
                },
            },
        }
    }
}

/// Writes one JSON document per response, newline separated.
pub struct ResponseWriter<W: Write> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write(&mut self, response: &Response) -> Result<()> {
        serde_json::to_writer(&mut self.writer, response)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(VendingError::from)
    }
}
