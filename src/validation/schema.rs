//! Typed result payloads, one per (service, operation).
//!
//! Deserialization drops fields a payload does not declare; range and
//! non-empty checks run afterwards in [`OperationResult::check`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

pub const COMPLAINT: &str = "complaint";
pub const IDENTITY: &str = "identity";
pub const APP_CRAWLER: &str = "appCrawler";

pub const CATEGORIZE: &str = "categorize";
pub const TRANSCRIBE: &str = "transcribe";
pub const DEEPFAKE: &str = "deepfake";
pub const VERIFY: &str = "verify";

/// Operations with a registered result schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Categorize,
    Transcribe,
    Deepfake,
    IdentityVerify,
    AppVerify,
}

impl Operation {
    pub fn lookup(service: &str, operation: &str) -> Option<Self> {
        match (service, operation) {
            (COMPLAINT, CATEGORIZE) => Some(Operation::Categorize),
            (COMPLAINT, TRANSCRIBE) => Some(Operation::Transcribe),
            (COMPLAINT, DEEPFAKE) => Some(Operation::Deepfake),
            (IDENTITY, VERIFY) => Some(Operation::IdentityVerify),
            (APP_CRAWLER, VERIFY) => Some(Operation::AppVerify),
            _ => None,
        }
    }

    /// Deserialize and range-check a `result` object.
    pub fn parse(self, result: &Value) -> Result<OperationResult, Vec<String>> {
        let parsed = match self {
            Operation::Categorize => from_value(result).map(OperationResult::Categorize),
            Operation::Transcribe => from_value(result).map(OperationResult::Transcribe),
            Operation::Deepfake => from_value(result).map(OperationResult::Deepfake),
            Operation::IdentityVerify => from_value(result).map(OperationResult::IdentityVerify),
            Operation::AppVerify => from_value(result).map(OperationResult::AppVerify),
        }?;

        let violations = parsed.check();
        if violations.is_empty() {
            Ok(parsed)
        } else {
            Err(violations)
        }
    }
}

fn from_value<T: for<'de> Deserialize<'de>>(value: &Value) -> Result<T, Vec<String>> {
    T::deserialize(value).map_err(|e| vec![format!("result: {e}")])
}

/// A JSON number expected within [0, 1]. Keeps the number as received so
/// `1` is forwarded as `1`, not `1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ratio(Number);

impl Ratio {
    pub fn zero() -> Self {
        Number::from_f64(0.0).map_or_else(|| Ratio(Number::from(0u8)), Ratio)
    }

    /// `NaN` when the number has no `f64` form.
    pub fn value(&self) -> f64 {
        self.0.as_f64().unwrap_or(f64::NAN)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Safe,
    Suspicious,
    Malicious,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub confidence: Ratio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizeResult {
    pub categories: Vec<Category>,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribeResult {
    pub text: String,
    pub confidence: Ratio,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepfakeResult {
    pub score: Ratio,
    pub label: String,
    pub confidence: Ratio,
    pub is_deepfake: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityVerifyResult {
    pub identity_verified: bool,
    pub confidence: Ratio,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppVerifyResult {
    pub package_match: bool,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<Map<String, Value>>,
}

/// A validated `result`, tagged by the operation that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OperationResult {
    Categorize(CategorizeResult),
    Transcribe(TranscribeResult),
    Deepfake(DeepfakeResult),
    IdentityVerify(IdentityVerifyResult),
    AppVerify(AppVerifyResult),
}

impl OperationResult {
    /// Range and non-empty violations.
    pub fn check(&self) -> Vec<String> {
        let mut v = Violations::default();
        match self {
            OperationResult::Categorize(r) => {
                for (i, category) in r.categories.iter().enumerate() {
                    v.non_empty(&format!("result.categories[{i}].name"), &category.name);
                    v.unit(&format!("result.categories[{i}].confidence"), &category.confidence);
                }
                for (i, keyword) in r.keywords.iter().flatten().enumerate() {
                    v.non_empty(&format!("result.keywords[{i}]"), keyword);
                }
            }
            OperationResult::Transcribe(r) => {
                v.non_empty("result.text", &r.text);
                v.unit("result.confidence", &r.confidence);
                if let Some(language) = &r.language {
                    v.non_empty("result.language", language);
                }
            }
            OperationResult::Deepfake(r) => {
                v.unit("result.score", &r.score);
                v.non_empty("result.label", &r.label);
                v.unit("result.confidence", &r.confidence);
            }
            OperationResult::IdentityVerify(r) => v.unit("result.confidence", &r.confidence),
            OperationResult::AppVerify(_) => {}
        }
        v.0
    }
}

#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn unit(&mut self, field: &str, ratio: &Ratio) {
        let value = ratio.value();
        if !(0.0..=1.0).contains(&value) {
            self.0.push(format!("{field} must be within [0, 1], got {value}"));
        }
    }

    fn non_empty(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            self.0.push(format!("{field} is not allowed to be empty"));
        }
    }
}

/// Conservative payload substituted for a rejected one.
pub fn safe_default_result(operation: Operation) -> OperationResult {
    match operation {
        Operation::Categorize => OperationResult::Categorize(CategorizeResult {
            categories: vec![Category {
                name: "Uncategorized".to_string(),
                confidence: Ratio::zero(),
            }],
            priority: Priority::Medium,
            keywords: Some(Vec::new()),
        }),
        Operation::Transcribe => OperationResult::Transcribe(TranscribeResult {
            text: String::new(),
            confidence: Ratio::zero(),
            language: Some("unknown".to_string()),
        }),
        Operation::Deepfake => OperationResult::Deepfake(DeepfakeResult {
            score: Ratio::zero(),
            label: "unverified".to_string(),
            confidence: Ratio::zero(),
            is_deepfake: false,
        }),
        Operation::IdentityVerify => OperationResult::IdentityVerify(IdentityVerifyResult {
            identity_verified: false,
            confidence: Ratio::zero(),
            details: None,
        }),
        Operation::AppVerify => {
            let mut details = Map::new();
            details.insert("message".to_string(), Value::from("Validation failed"));
            OperationResult::AppVerify(AppVerifyResult {
                package_match: false,
                verdict: Verdict::Error,
                details: Some(details),
                hashes: None,
            })
        }
    }
}

/// Message carried by the safe-default envelope of each operation.
pub fn safe_default_message(operation: Option<Operation>) -> &'static str {
    match operation {
        Some(Operation::Transcribe) => "Transcription service returned invalid response",
        Some(Operation::Deepfake) => "Deepfake detection returned invalid response",
        Some(Operation::IdentityVerify) => "Identity verification returned invalid response",
        Some(Operation::AppVerify) => "App verification returned invalid response",
        Some(Operation::Categorize) | None => "ML service returned invalid response",
    }
}
