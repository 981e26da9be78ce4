//! Admission control: what an ingest request must satisfy before dispatch.

use crate::error::IngestError;
use crate::pipeline::RawEnvelope;
use crate::telemetry::TelemetryKind;
use serde_json::Value;

pub const MAX_PROJECT_CHARS: usize = 64;

/// A batch that passed every admission check.
#[derive(Debug)]
pub struct Admitted {
    pub kind: TelemetryKind,
    pub project: String,
    pub data: Vec<Value>,
}

/// Bodies at or above the cap are refused before any decryption.
pub fn check_body_size(size: usize, limit: usize) -> Result<(), IngestError> {
    if size >= limit {
        return Err(IngestError::PayloadTooLarge { size, limit });
    }
    Ok(())
}

/// 1 to 64 code points of ASCII alphanumerics, `_`, `-`, `.` or CJK
/// unified ideographs (U+4E00 to U+9FFF).
pub fn is_valid_project(project: &str) -> bool {
    let len = project.chars().count();
    if len == 0 || len > MAX_PROJECT_CHARS {
        return false;
    }
    project.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') || ('\u{4E00}'..='\u{9FFF}').contains(&c)
    })
}

/// Validate project, then source, then that there is data to project.
pub fn admit(envelope: RawEnvelope) -> Result<Admitted, IngestError> {
    if !is_valid_project(&envelope.project) {
        return Err(IngestError::Validation(format!(
            "invalid project name {:?}",
            envelope.project
        )));
    }
    let kind = TelemetryKind::from_wire(&envelope.source).ok_or_else(|| {
        IngestError::Validation(format!("unsupported source {:?}", envelope.source))
    })?;
    if envelope.data.is_empty() {
        return Err(IngestError::Format("`data` is empty".to_string()));
    }
    Ok(Admitted {
        kind,
        project: envelope.project,
        data: envelope.data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(project: &str, source: &str, data: Vec<Value>) -> RawEnvelope {
        RawEnvelope {
            project: project.to_string(),
            source: source.to_string(),
            data,
        }
    }

    #[test]
    fn test_project_length_boundary() {
        assert!(is_valid_project(&"a".repeat(64)));
        assert!(!is_valid_project(&"a".repeat(65)));
        // Counted in code points, not bytes
        assert!(is_valid_project(&"支".repeat(64)));
        assert!(!is_valid_project(&"支".repeat(65)));
        assert!(!is_valid_project(""));
    }

    #[test]
    fn test_project_charset() {
        assert!(is_valid_project("svc-a_01.prod"));
        assert!(is_valid_project("支付中心"));
        assert!(!is_valid_project("svc a"));
        assert!(!is_valid_project("svc/a"));
        assert!(!is_valid_project("プロジェクト"));
        assert!(!is_valid_project("café"));
    }

    #[test]
    fn test_body_size_boundary() {
        let cap = 10 * 1024 * 1024;
        assert!(check_body_size(cap - 1, cap).is_ok());
        assert!(matches!(
            check_body_size(cap, cap),
            Err(IngestError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_admit_checks_in_order() {
        let err = admit(envelope("bad project", "nope", vec![])).unwrap_err();
        assert!(err.to_string().contains("project"));

        let err = admit(envelope("svc-a", "nope", vec![])).unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
        assert!(err.to_string().contains("source"));

        let err = admit(envelope("svc-a", "hard", vec![])).unwrap_err();
        assert!(matches!(err, IngestError::Format(_)));

        let ok = admit(envelope("svc-a", "hard", vec![json!({"hostName": "h1"})])).unwrap();
        assert_eq!(ok.kind, TelemetryKind::Hardware);
        assert_eq!(ok.project, "svc-a");
    }
}
