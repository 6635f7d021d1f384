//! Request and response shapes exchanged with the AI service.
//!
//! The gateway forwards these unchanged, so field names follow the wire format.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::timeouts::TimeoutPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub patient_id: String,
    pub name: String,
    pub age: u32,
    pub gender: String,
    #[serde(default)]
    pub admission_date: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    pub document_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A retrieved document passage backing an assistant answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub source: String,
    pub section: String,
    pub score: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
}

/// The role/content pair replayed to the AI service as conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&ChatTurn> for HistoryEntry {
    fn from(turn: &ChatTurn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub patient_id: String,
    pub question: String,
    #[serde(default)]
    pub conversation_history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatResponse {
    /// The assistant turn this answer becomes in a conversation.
    pub fn into_turn(self, fallback_timestamp: String) -> ChatTurn {
        ChatTurn {
            role: Role::Assistant,
            content: self.answer,
            timestamp: self.timestamp.unwrap_or(fallback_timestamp),
            sources: Some(self.sources),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub patient_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResponse {
    pub report: Report,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// What a service publishes about itself at its root path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Budgets the service applies to its own upstream calls.
    pub timeouts_secs: TimeoutPolicy,
}

/// Structured discharge report.
///
/// Every section may be absent. Values are taken into the typed fields only
/// when they have the expected shape; anything else, including `null` and the
/// fields the service adds beyond the known sections, stays in `extra` and is
/// serialized back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Map<String, Value>")]
pub struct Report {
    #[serde(rename = "patient_id", skip_serializing_if = "String::is_empty")]
    pub patient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_info: Option<PatientInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnoses: Option<Diagnoses>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinical_course: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub therapy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medications: Option<Vec<Medication>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labs: Option<Labs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Recommendations>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for Report {
    fn from(mut map: Map<String, Value>) -> Self {
        Self {
            patient_id: take(&mut map, "patient_id").unwrap_or_default(),
            patient_info: take(&mut map, "patientInfo"),
            admission_reason: take(&mut map, "admissionReason"),
            diagnoses: take(&mut map, "diagnoses"),
            clinical_course: take(&mut map, "clinicalCourse"),
            therapy: take(&mut map, "therapy"),
            medications: take(&mut map, "medications"),
            labs: take(&mut map, "labs"),
            recommendations: take(&mut map, "recommendations"),
            extra: map,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Map<String, Value>")]
pub struct PatientInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discharge_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_of_stay: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for PatientInfo {
    fn from(mut map: Map<String, Value>) -> Self {
        Self {
            name: take(&mut map, "name"),
            age: take(&mut map, "age"),
            gender: take(&mut map, "gender"),
            admission_date: take(&mut map, "admissionDate"),
            discharge_date: take(&mut map, "dischargeDate"),
            length_of_stay: take(&mut map, "lengthOfStay"),
            department: take(&mut map, "department"),
            extra: map,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Diagnoses {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for Diagnoses {
    fn from(mut map: Map<String, Value>) -> Self {
        Self {
            primary: take(&mut map, "primary"),
            secondary: take(&mut map, "secondary"),
            extra: map,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Medication {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indication: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for Medication {
    fn from(mut map: Map<String, Value>) -> Self {
        Self {
            name: take(&mut map, "name"),
            dose: take(&mut map, "dose"),
            frequency: take(&mut map, "frequency"),
            indication: take(&mut map, "indication"),
            extra: map,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Labs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notable: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for Labs {
    fn from(mut map: Map<String, Value>) -> Self {
        Self {
            summary: take(&mut map, "summary"),
            notable: take(&mut map, "notable"),
            extra: map,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Map<String, Value>")]
pub struct Recommendations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambulatory: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifestyle: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for Recommendations {
    fn from(mut map: Map<String, Value>) -> Self {
        Self {
            follow_up: take(&mut map, "followUp"),
            ambulatory: take(&mut map, "ambulatory"),
            lifestyle: take(&mut map, "lifestyle"),
            extra: map,
        }
    }
}

/// Moves `key` out of `map` if it holds a well-formed `T`. Nulls and values of
/// any other shape are left in place.
fn take<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = map.get(key)?;
    if value.is_null() {
        return None;
    }
    let parsed = T::deserialize(value).ok()?;
    map.remove(key);
    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn report_with_only_some_sections_keeps_unknown_fields() {
        let wire = json!({
            "patient_id": "p1",
            "admissionReason": "Dyspnoe",
            "diagnoses": { "primary": "Pneumonie", "secondary": ["COPD"] },
            "generatedBy": "llama3",
            "recommendations": { "followUp": ["Kontrolle in 2 Wochen"] }
        });

        let report: Report = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(report.patient_id, "p1");
        assert!(report.patient_info.is_none());
        assert!(report.medications.is_none());
        assert_eq!(
            report.diagnoses.as_ref().unwrap().secondary,
            Some(vec!["COPD".to_string()])
        );
        let recommendations = report.recommendations.as_ref().unwrap();
        assert_eq!(
            recommendations.follow_up,
            Some(vec!["Kontrolle in 2 Wochen".to_string()])
        );
        assert!(recommendations.lifestyle.is_none());
        assert_eq!(report.extra.get("generatedBy"), Some(&json!("llama3")));

        let back = serde_json::to_value(&report).unwrap();
        assert_eq!(back["generatedBy"], "llama3");
        assert_eq!(back["admissionReason"], "Dyspnoe");
        assert!(back.get("clinicalCourse").is_none());
        assert_eq!(back, wire);
    }

    #[test]
    fn fallback_report_keeps_nested_fields() {
        let wire = json!({
            "patient_id": "p1",
            "patientInfo": { "name": "Nicht verfügbar", "note": "LLM nicht konfiguriert" },
            "rawData": "[entlassbrief.pdf - Diagnosen]: ...",
            "message": "Bericht konnte nicht vollständig generiert werden"
        });

        let report: Report = serde_json::from_value(wire.clone()).unwrap();
        let info = report.patient_info.as_ref().unwrap();
        assert_eq!(info.name.as_deref(), Some("Nicht verfügbar"));
        assert_eq!(info.extra["note"], "LLM nicht konfiguriert");

        let back = serde_json::to_value(&report).unwrap();
        assert_eq!(back["patientInfo"]["note"], "LLM nicht konfiguriert");
        assert_eq!(back, wire);
    }

    #[test]
    fn loosely_filled_sections_do_not_fail_the_report() {
        let wire = json!({
            "report": {
                "patient_id": "p1",
                "generated_at": null,
                "patientInfo": {
                    "name": "Anna Schmidt",
                    "age": 67,
                    "lengthOfStay": "Keine Angaben",
                    "dischargeDate": null
                },
                "diagnoses": { "primary": null, "secondary": "Keine Angaben" },
                "medications": "Keine Angaben",
                "labs": { "summary": "Keine Angaben", "notable": [] },
                "therapy": null
            },
            "timestamp": "2024-05-01T10:00:00"
        });

        let response: ReportResponse = serde_json::from_value(wire.clone()).unwrap();
        let report = &response.report;
        let info = report.patient_info.as_ref().unwrap();
        assert_eq!(info.age, Some(67));
        assert_eq!(info.length_of_stay, None);
        assert_eq!(info.extra["lengthOfStay"], "Keine Angaben");
        assert_eq!(report.diagnoses.as_ref().unwrap().primary, None);
        assert!(report.medications.is_none());
        assert_eq!(report.labs.as_ref().unwrap().notable, Some(vec![]));
        assert!(report.therapy.is_none());

        assert_eq!(serde_json::to_value(&response).unwrap(), wire);
    }

    #[test]
    fn empty_report_is_valid() {
        let report: Report = serde_json::from_value(json!({ "patient_id": "p2" })).unwrap();
        let expected = Report {
            patient_id: "p2".to_string(),
            ..Report::default()
        };
        assert_eq!(report, expected);
    }

    #[test]
    fn chat_response_becomes_assistant_turn() {
        let response = ChatResponse {
            answer: "Keine Auffälligkeiten".to_string(),
            sources: vec![],
            timestamp: None,
            extra: Map::new(),
        };
        let turn = response.into_turn("2024-01-01T00:00:00Z".to_string());
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.timestamp, "2024-01-01T00:00:00Z");
        assert_eq!(turn.sources, Some(vec![]));
    }

    #[test]
    fn chat_request_defaults_missing_history() {
        let request: ChatRequest =
            serde_json::from_value(json!({ "patient_id": "p1", "question": "?" })).unwrap();
        assert!(request.conversation_history.is_empty());
    }
}
