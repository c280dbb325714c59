//! Failed-request evidence
//!
//! Every classified request failure is appended to `failed_requests.jsonl`
//! under the evidence directory. Response bodies are sampled into
//! `failed_responses/<hash>.txt`, one file per distinct body.

use crate::Result;
use chrono::{FixedOffset, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Bytes of a response body kept in a sample file
const BODY_SAMPLE_LIMIT: usize = 2048;

const TRUNCATION_MARKER: &[u8] = b"\n...[TRUNCATED]";

/// Header name fragments that mark a credential-bearing header
const REDACTED_HEADER_MARKERS: [&str; 4] = ["auth", "key", "cookie", "token"];

/// One failed request as seen by the fetch layer
#[derive(Debug, Clone)]
pub struct FailedRequest<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub status: Option<u16>,
    pub error_type: &'a str,
    pub headers: &'a [(String, String)],
    pub context: serde_json::Value,
    pub body: Option<&'a [u8]>,
}

#[derive(Serialize)]
struct EvidenceEntry<'a> {
    timestamp: String,
    run_id: &'a str,
    method: &'a str,
    full_url: &'a str,
    status_code: Option<u16>,
    error_type: &'a str,
    headers: Vec<(&'a str, &'a str)>,
    context: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    body_sample_path: Option<String>,
}

/// Writes redacted request evidence for post-mortem diagnosis
#[derive(Debug, Clone)]
pub struct EvidenceRecorder {
    run_id: String,
    offset: FixedOffset,
    requests_log: PathBuf,
    responses_dir: PathBuf,
}

impl EvidenceRecorder {
    /// Creates the evidence directories under `dir`
    ///
    /// Entry timestamps are rendered in `offset`, the run's fixed offset.
    pub fn new(run_id: &str, dir: &Path, offset: FixedOffset) -> Result<Self> {
        let responses_dir = dir.join("failed_responses");
        fs::create_dir_all(&responses_dir)?;

        Ok(Self {
            run_id: run_id.to_string(),
            offset,
            requests_log: dir.join("failed_requests.jsonl"),
            responses_dir,
        })
    }

    pub fn requests_log(&self) -> &Path {
        &self.requests_log
    }

    /// Appends one evidence entry, sampling the body if one is given
    ///
    /// # Returns
    ///
    /// The path of the body sample file, if a body was provided
    pub fn log_failed_request(&self, request: &FailedRequest<'_>) -> Result<Option<PathBuf>> {
        let sample_path = match request.body.filter(|b| !b.is_empty()) {
            Some(body) => Some(self.write_body_sample(body)?),
            None => None,
        };

        let entry = EvidenceEntry {
            timestamp: Utc::now().with_timezone(&self.offset).to_rfc3339(),
            run_id: &self.run_id,
            method: request.method,
            full_url: request.url,
            status_code: request.status,
            error_type: request.error_type,
            headers: redact_headers(request.headers),
            context: &request.context,
            body_sample_path: sample_path.as_ref().map(|p| p.display().to_string()),
        };

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.requests_log)?;
        file.write_all(line.as_bytes())?;

        Ok(sample_path)
    }

    fn write_body_sample(&self, body: &[u8]) -> Result<PathBuf> {
        let digest = hex::encode(Sha256::digest(body));
        let path = self.responses_dir.join(format!("{}.txt", &digest[..16]));

        if !path.exists() {
            let mut sample = body[..body.len().min(BODY_SAMPLE_LIMIT)].to_vec();
            if body.len() > BODY_SAMPLE_LIMIT {
                sample.extend_from_slice(TRUNCATION_MARKER);
            }
            fs::write(&path, sample)?;
        }

        Ok(path)
    }
}

/// Drops every header whose name looks credential-bearing
pub fn redact_headers(headers: &[(String, String)]) -> Vec<(&str, &str)> {
    headers
        .iter()
        .filter(|(name, _)| {
            let lower = name.to_ascii_lowercase();
            !REDACTED_HEADER_MARKERS.iter().any(|m| lower.contains(m))
        })
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect()
}
