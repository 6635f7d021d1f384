//! Client-side chat history for the currently selected patient.
//!
//! The AI service is stateless, so every question is sent together with the
//! whole conversation so far. A `Conversation` is append-only and lives only
//! as long as the patient stays selected.

use chrono::{SecondsFormat, Utc};

use crate::client::InferenceClient;
use crate::contracts::{ChatRequest, ChatTurn, HistoryEntry, PatientSummary, Role};
use crate::error::{ClientError, Result};

pub const APOLOGY: &str =
    "Entschuldigung, es gab einen Fehler bei der Verarbeitung Ihrer Anfrage.";

pub const SUGGESTED_QUESTIONS: [&str; 5] = [
    "Gib mir eine Zusammenfassung",
    "Welche Diagnosen wurden gestellt?",
    "Welche Medikamente nimmt der Patient?",
    "Wie war der klinische Verlauf?",
    "Welche Laborwerte sind auffällig?",
];

pub fn greeting_for(patient_name: &str) -> String {
    format!(
        "Hallo! Ich kann Ihnen Fragen zu den Patientenakten von **{}** beantworten. Was möchten Sie wissen?",
        patient_name
    )
}

pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone)]
pub struct Conversation {
    patient_id: String,
    patient_name: String,
    turns: Vec<ChatTurn>,
}

impl Conversation {
    /// Starts a conversation holding only the greeting for `patient`.
    pub fn for_patient(patient: &PatientSummary) -> Self {
        Self {
            patient_id: patient.patient_id.clone(),
            patient_name: patient.name.clone(),
            turns: vec![ChatTurn {
                role: Role::Assistant,
                content: greeting_for(&patient.name),
                timestamp: now_timestamp(),
                sources: None,
            }],
        }
    }

    /// Drops everything said so far and greets the new patient.
    pub fn switch_patient(&mut self, patient: &PatientSummary) {
        *self = Self::for_patient(patient);
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn patient_name(&self) -> &str {
        &self.patient_name
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn last_turn(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    /// Only the greeting has been said so far.
    pub fn is_fresh(&self) -> bool {
        self.turns.len() == 1
    }

    /// Role and content of every turn in order, sources stripped.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.turns.iter().map(HistoryEntry::from).collect()
    }

    /// Asks `question` and appends both the question and the reply.
    ///
    /// The user turn is recorded before the call is made. When the call
    /// fails an apology turn is appended instead of an answer and the error
    /// is returned, so the conversation always ends with an assistant turn.
    /// Callers must not run two `ask`s on one conversation concurrently.
    pub async fn ask(
        &mut self,
        client: &dyn InferenceClient,
        question: &str,
    ) -> Result<&ChatTurn> {
        if question.trim().is_empty() {
            return Err(ClientError::missing_field("question"));
        }

        let request = ChatRequest {
            patient_id: self.patient_id.clone(),
            question: question.to_string(),
            conversation_history: self.history(),
        };

        self.turns.push(ChatTurn {
            role: Role::User,
            content: question.to_string(),
            timestamp: now_timestamp(),
            sources: None,
        });

        match client.chat(&request).await {
            Ok(response) => {
                self.turns.push(response.into_turn(now_timestamp()));
                Ok(&self.turns[self.turns.len() - 1])
            }
            Err(e) => {
                tracing::warn!(error = %e, "Chat turn failed, recording apology");
                self.turns.push(ChatTurn {
                    role: Role::Assistant,
                    content: APOLOGY.to_string(),
                    timestamp: now_timestamp(),
                    sources: None,
                });
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ChatResponse, PatientSummary, ReportRequest, ReportResponse, Source};
    use crate::timeouts::Operation;
    use crate::upload::UploadBatch;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::Mutex;

    /// Records every chat request and answers from a script.
    struct ScriptedClient {
        seen: Mutex<Vec<ChatRequest>>,
        fail: bool,
    }

    impl ScriptedClient {
        fn new(fail: bool) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl InferenceClient for ScriptedClient {
        async fn list_patients(&self) -> Result<Vec<PatientSummary>> {
            Ok(vec![])
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
            self.seen.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(ClientError::UpstreamTimeout {
                    operation: Operation::Chat,
                    budget: std::time::Duration::from_secs(60),
                });
            }
            Ok(ChatResponse {
                answer: format!("Antwort auf {}", request.question),
                sources: vec![Source {
                    source: "entlassbrief.pdf".to_string(),
                    section: "Diagnosen".to_string(),
                    score: 0.9,
                    text: "Pneumonie".to_string(),
                }],
                timestamp: Some("2024-05-01T10:00:00".to_string()),
                extra: Map::new(),
            })
        }

        async fn generate_report(&self, _request: &ReportRequest) -> Result<ReportResponse> {
            unreachable!("not used in conversation tests")
        }

        async fn upload_documents(&self, _batch: UploadBatch) -> Result<Value> {
            unreachable!("not used in conversation tests")
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    fn patient(id: &str, name: &str) -> PatientSummary {
        PatientSummary {
            patient_id: id.to_string(),
            name: name.to_string(),
            age: 70,
            gender: "weiblich".to_string(),
            admission_date: None,
            department: None,
            document_count: 2,
        }
    }

    #[test]
    fn new_conversation_greets_patient_by_name() {
        let conversation = Conversation::for_patient(&patient("p1", "Anna Schmidt"));
        assert!(conversation.is_fresh());
        let greeting = &conversation.turns()[0];
        assert_eq!(greeting.role, Role::Assistant);
        assert!(greeting.content.contains("**Anna Schmidt**"));
    }

    #[tokio::test]
    async fn each_turn_replays_the_previous_ones_in_order() {
        let client = ScriptedClient::new(false);
        let mut conversation = Conversation::for_patient(&patient("p1", "Anna Schmidt"));

        conversation.ask(&client, "a").await.unwrap();
        let reply = conversation.ask(&client, "c").await.unwrap();
        assert_eq!(reply.content, "Antwort auf c");
        assert_eq!(reply.sources.as_ref().map(Vec::len), Some(1));

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].conversation_history.len(), 1);

        let second = &seen[1].conversation_history;
        assert_eq!(second.len(), 3);
        assert_eq!(second[0].role, Role::Assistant);
        assert_eq!(second[1], HistoryEntry::new(Role::User, "a"));
        assert_eq!(second[2], HistoryEntry::new(Role::Assistant, "Antwort auf a"));
        assert_eq!(seen[1].question, "c");
        assert_eq!(conversation.turns().len(), 5);
    }

    #[tokio::test]
    async fn failed_call_keeps_question_and_appends_apology() {
        let client = ScriptedClient::new(true);
        let mut conversation = Conversation::for_patient(&patient("p1", "Anna Schmidt"));

        let err = conversation.ask(&client, "Zusammenfassung?").await.unwrap_err();
        assert!(err.is_retryable());

        let turns = conversation.turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].role, Role::User);
        assert_eq!(turns[1].content, "Zusammenfassung?");
        assert_eq!(turns[2].role, Role::Assistant);
        assert_eq!(turns[2].content, APOLOGY);
    }

    #[tokio::test]
    async fn switching_patient_resets_to_greeting() {
        let client = ScriptedClient::new(false);
        let mut conversation = Conversation::for_patient(&patient("p1", "Anna Schmidt"));
        conversation.ask(&client, "a").await.unwrap();

        conversation.switch_patient(&patient("p2", "Karl Weber"));
        assert_eq!(conversation.patient_id(), "p2");
        assert!(conversation.is_fresh());
        assert!(conversation.turns()[0].content.contains("Karl Weber"));
    }

    #[tokio::test]
    async fn blank_question_is_not_recorded() {
        let client = ScriptedClient::new(false);
        let mut conversation = Conversation::for_patient(&patient("p1", "Anna Schmidt"));
        assert!(conversation.ask(&client, "  ").await.is_err());
        assert!(conversation.is_fresh());
        assert!(client.seen.lock().unwrap().is_empty());
    }
}
