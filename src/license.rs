//! License domain types.
//!
//! - [`LicenseRecord`] is the persisted artifact (at most one per installation).
//! - [`Submission`] is the validated input of an upload; it can only be built when
//!   a code or a file is actually present.
//! - [`EntitlementState`] is the read model computed on every request.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize, Serializer};

use crate::errors::{LicenseError, LicenseResult};

/// Edition reported for every installation.
///
/// Constant regardless of what license is stored; there is no tiering logic.
pub const EDITION: u8 = 3;

/// Entitlement state code for an active license.
pub const STATE_ACTIVE: u8 = 1;

/// Message returned when a submission carries neither a code nor a file.
pub const MISSING_INPUT: &str = "missing license input";

/// Origin of a license submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    /// Pasted textual code
    Code,
    /// Uploaded file
    File,
}

impl LicenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseType::Code => "code",
            LicenseType::File => "file",
        }
    }
}

impl fmt::Display for LicenseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A license as persisted by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRecord {
    pub id: i64,
    pub license_type: LicenseType,
    pub code: String,
    pub data: Vec<u8>,
    pub created_at: NaiveDateTime,
}

/// The insertable part of a record. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLicense {
    pub license_type: LicenseType,
    pub code: String,
    pub data: Vec<u8>,
}

/// A validated license submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A pasted license code.
    Code(String),
    /// An uploaded license file, optionally accompanied by a code.
    File { data: Vec<u8>, code: String },
}

impl Submission {
    /// Build a code submission. Surrounding whitespace is trimmed; an empty code is rejected.
    pub fn code(code: impl AsRef<str>) -> LicenseResult<Self> {
        let code = code.as_ref().trim();
        if code.is_empty() {
            return Err(LicenseError::InvalidSubmission(MISSING_INPUT.to_string()));
        }
        Ok(Submission::Code(code.to_string()))
    }

    /// Build a file submission. An empty file is rejected.
    pub fn file(data: Vec<u8>, code: impl AsRef<str>) -> LicenseResult<Self> {
        if data.is_empty() {
            return Err(LicenseError::InvalidSubmission(MISSING_INPUT.to_string()));
        }
        Ok(Submission::File {
            data,
            code: code.as_ref().trim().to_string(),
        })
    }

    /// Build a submission from the optional parts of an upload form.
    ///
    /// A non-empty file takes precedence and keeps the code alongside it.
    /// Otherwise a non-empty code is required.
    pub fn from_parts(code: Option<String>, file: Option<Vec<u8>>) -> LicenseResult<Self> {
        match file {
            Some(data) if !data.is_empty() => Submission::file(data, code.unwrap_or_default()),
            _ => Submission::code(code.unwrap_or_default()),
        }
    }

    pub fn license_type(&self) -> LicenseType {
        match self {
            Submission::Code(_) => LicenseType::Code,
            Submission::File { .. } => LicenseType::File,
        }
    }

    /// Normalize into the record that will be written.
    pub fn into_new_license(self) -> NewLicense {
        match self {
            Submission::Code(code) => NewLicense {
                license_type: LicenseType::Code,
                data: code.clone().into_bytes(),
                code,
            },
            Submission::File { data, code } => NewLicense {
                license_type: LicenseType::File,
                code,
                data,
            },
        }
    }
}

/// The entitlement view returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitlementState {
    pub edition: u8,
    pub state: u8,
    #[serde(rename = "type", serialize_with = "serialize_license_type")]
    pub license_type: Option<LicenseType>,
    pub code: String,
}

impl Default for EntitlementState {
    fn default() -> Self {
        Self {
            edition: EDITION,
            state: STATE_ACTIVE,
            license_type: None,
            code: String::new(),
        }
    }
}

impl From<&LicenseRecord> for EntitlementState {
    fn from(record: &LicenseRecord) -> Self {
        Self {
            license_type: Some(record.license_type),
            code: record.code.clone(),
            ..Self::default()
        }
    }
}

// Absent type is reported as an empty string.
fn serialize_license_type<S>(value: &Option<LicenseType>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(value.map(|t| t.as_str()).unwrap_or(""))
}
