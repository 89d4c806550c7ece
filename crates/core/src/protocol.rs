//! Wire messages exchanged with the driver.
//!
//! Every message is one line of JSON:
//!
//! ```text
//! driver -> agent   {"prefix":[{"a":0,"c":3}]}
//! agent  -> driver  {"path":[{"a":0,"c":3},{"a":2,"c":4}],"score":7}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// One decision point: which alternative was taken out of how many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "a")]
    chosen_index: usize,
    #[serde(rename = "c")]
    choice_count: usize,
}

impl Step {
    /// Returns `None` unless `chosen_index < choice_count`.
    pub fn new(chosen_index: usize, choice_count: usize) -> Option<Self> {
        (chosen_index < choice_count).then_some(Self {
            chosen_index,
            choice_count,
        })
    }

    pub fn chosen_index(&self) -> usize {
        self.chosen_index
    }

    pub fn choice_count(&self) -> usize {
        self.choice_count
    }

    fn is_valid(&self) -> bool {
        self.chosen_index < self.choice_count
    }
}

/// Start of an episode: the steps to force before free sampling resumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub prefix: Vec<Step>,
}

/// End of an episode: everything that was chosen, and how well it went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub path: Vec<Step>,
    pub score: i64,
}

pub fn encode_response(response: &Response) -> Result<String> {
    to_line(response)
}

pub fn decode_request(line: &str) -> Result<Request> {
    let request: Request = from_line(line)?;
    check_steps(line, &request.prefix)?;
    Ok(request)
}

/// Decodes a request straight from transport bytes; invalid UTF-8 is a decode error.
pub fn decode_request_bytes(bytes: &[u8]) -> Result<Request> {
    let line = std::str::from_utf8(bytes)
        .map_err(|e| SessionError::decode(&String::from_utf8_lossy(bytes), e))?;
    decode_request(line)
}

pub fn encode_request(request: &Request) -> Result<String> {
    to_line(request)
}

pub fn decode_response(line: &str) -> Result<Response> {
    let response: Response = from_line(line)?;
    check_steps(line, &response.path)?;
    Ok(response)
}

fn to_line<T: Serialize>(msg: &T) -> Result<String> {
    // Compact serde_json output never contains a raw newline.
    serde_json::to_string(msg)
        .map_err(|e| SessionError::InvalidArgument(format!("serialize: {e}")))
}

fn from_line<'a, T: Deserialize<'a>>(line: &'a str) -> Result<T> {
    serde_json::from_str(line.trim()).map_err(|e| SessionError::decode(line, e))
}

fn check_steps(line: &str, steps: &[Step]) -> Result<()> {
    match steps.iter().position(|s| !s.is_valid()) {
        None => Ok(()),
        Some(i) => Err(SessionError::decode(
            line,
            format!(
                "step {i} chooses {} out of {}",
                steps[i].chosen_index, steps[i].choice_count
            ),
        )),
    }
}
