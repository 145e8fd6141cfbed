//! services/api/src/adapters/firestore.rs
//!
//! This module contains the document-store adapter, which is the concrete
//! implementation of the `UserStore` port from the `core` crate. It talks to
//! the Firestore REST API (one `users` collection keyed by username) with a
//! bearer token obtained from a service-account credential.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use gcp_auth::Token;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use tutor_core::domain::{
    ChatMessage, DifficultyLevel, LearningPace, LearningPreferences, LearningStyle,
    MessageRole, UserPatch, UserProfile,
};
use tutor_core::ports::{PortError, PortResult, UserStore};

const FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com/v1";
const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A Firestore adapter that implements the `UserStore` port.
#[derive(Clone)]
pub struct FirestoreAdapter {
    http: reqwest::Client,
    token: Arc<RwLock<Token>>,
    credentials_path: String,
    project_id: String,
}

impl FirestoreAdapter {
    /// Authenticates against GCP with the service-account file and caches
    /// the resulting token.
    pub async fn new(
        credentials_path: String,
        project_id: String,
    ) -> Result<Self, gcp_auth::Error> {
        let authenticator = gcp_auth::from_credentials_file(credentials_path.clone()).await?;
        let token = authenticator.get_token(&[FIRESTORE_SCOPE]).await?;

        Ok(Self {
            http: reqwest::Client::new(),
            token: Arc::new(RwLock::new(token)),
            credentials_path,
            project_id,
        })
    }

    /// Refreshes the cached token when it has expired.
    async fn update_token(&self) -> Result<(), gcp_auth::Error> {
        let mut token = self.token.write().await;
        if token.has_expired() {
            let authenticator =
                gcp_auth::from_credentials_file(self.credentials_path.clone()).await?;
            *token = authenticator.get_token(&[FIRESTORE_SCOPE]).await?;
        }
        Ok(())
    }

    async fn bearer(&self) -> PortResult<String> {
        self.update_token()
            .await
            .map_err(|e| PortError::Unexpected(format!("GCP auth failed: {}", e)))?;
        let token = self.token.read().await;
        Ok(token.as_str().to_string())
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/users",
            FIRESTORE_ENDPOINT, self.project_id
        )
    }

    fn document_url(&self, username: &str) -> String {
        format!("{}/{}", self.collection_url(), username)
    }
}

//=========================================================================================
// Firestore Wire Structs
//=========================================================================================

/// One Firestore document: a named bag of typed values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FirestoreDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
}

/// A Firestore value. Exactly one variant field is set; integers travel as
/// decimal strings on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Value {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    integer_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    array_value: Option<ArrayValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    map_value: Option<MapValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ArrayValue {
    // Firestore omits `values` entirely for an empty array.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    values: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MapValue {
    #[serde(default)]
    fields: BTreeMap<String, Value>,
}

impl Value {
    fn string(s: impl Into<String>) -> Self {
        Value { string_value: Some(s.into()), ..Default::default() }
    }

    fn integer(i: i64) -> Self {
        Value { integer_value: Some(i.to_string()), ..Default::default() }
    }

    fn array(values: Vec<Value>) -> Self {
        Value { array_value: Some(ArrayValue { values }), ..Default::default() }
    }

    fn map(fields: BTreeMap<String, Value>) -> Self {
        Value { map_value: Some(MapValue { fields }), ..Default::default() }
    }

    fn as_str(&self) -> Option<&str> {
        self.string_value.as_deref()
    }

    fn as_i64(&self) -> Option<i64> {
        self.integer_value.as_deref().and_then(|s| s.parse().ok())
    }

    fn as_array(&self) -> &[Value] {
        self.array_value.as_ref().map(|a| a.values.as_slice()).unwrap_or(&[])
    }

    fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        self.map_value.as_ref().map(|m| &m.fields)
    }
}

//=========================================================================================
// Domain <-> Wire Mapping
//=========================================================================================

fn message_value(message: &ChatMessage) -> Value {
    let mut fields = BTreeMap::new();
    fields.insert("role".to_string(), Value::string(message.role.as_str()));
    fields.insert("content".to_string(), Value::string(message.content.clone()));
    Value::map(fields)
}

/// Entries with an unknown role are dropped rather than failing the read.
fn message_from_value(value: &Value) -> Option<ChatMessage> {
    let fields = value.as_map()?;
    let role = MessageRole::from_name(fields.get("role")?.as_str()?)?;
    let content = fields.get("content")?.as_str()?.to_string();
    Some(ChatMessage { role, content })
}

fn preferences_value(preferences: &LearningPreferences) -> Value {
    let mut fields = BTreeMap::new();
    fields.insert("style".to_string(), Value::string(preferences.style.as_str()));
    fields.insert("pace".to_string(), Value::string(preferences.pace.as_str()));
    fields.insert(
        "difficulty".to_string(),
        Value::string(preferences.difficulty.as_str()),
    );
    Value::map(fields)
}

/// Unknown preference strings fall back to the defaults, matching the
/// lenient reads the form layer performs.
fn preferences_from_value(value: &Value) -> LearningPreferences {
    let Some(fields) = value.as_map() else {
        return LearningPreferences::default();
    };
    let lookup = |key: &str| fields.get(key).and_then(Value::as_str).unwrap_or("");
    LearningPreferences {
        style: LearningStyle::from_name(lookup("style")).unwrap_or_default(),
        pace: LearningPace::from_name(lookup("pace")).unwrap_or_default(),
        difficulty: DifficultyLevel::from_name(lookup("difficulty")).unwrap_or_default(),
    }
}

fn subjects_value(subjects: &[String]) -> Value {
    Value::array(subjects.iter().map(Value::string).collect())
}

fn chat_history_value(transcript: &[ChatMessage]) -> Value {
    Value::array(transcript.iter().map(message_value).collect())
}

fn fields_from_profile(profile: &UserProfile) -> BTreeMap<String, Value> {
    let mut fields = BTreeMap::new();
    fields.insert("username".to_string(), Value::string(profile.username.clone()));
    fields.insert("first_name".to_string(), Value::string(profile.first_name.clone()));
    fields.insert("last_name".to_string(), Value::string(profile.last_name.clone()));
    fields.insert("email".to_string(), Value::string(profile.email.clone()));
    fields.insert(
        "password_hash".to_string(),
        Value::string(profile.password_hash.clone()),
    );
    fields.insert("tokens".to_string(), Value::integer(profile.tokens));
    fields.insert(
        "learning_preferences".to_string(),
        preferences_value(&profile.preferences),
    );
    fields.insert("subjects".to_string(), subjects_value(&profile.subjects));
    fields.insert(
        "chat_history".to_string(),
        chat_history_value(&profile.chat_history),
    );
    fields
}

fn profile_from_fields(fields: &BTreeMap<String, Value>) -> UserProfile {
    let text = |key: &str| {
        fields
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    UserProfile {
        username: text("username"),
        first_name: text("first_name"),
        last_name: text("last_name"),
        email: text("email"),
        password_hash: text("password_hash"),
        tokens: fields.get("tokens").and_then(Value::as_i64).unwrap_or(0),
        preferences: fields
            .get("learning_preferences")
            .map(preferences_from_value)
            .unwrap_or_default(),
        subjects: fields
            .get("subjects")
            .map(|v| {
                v.as_array()
                    .iter()
                    .filter_map(|s| s.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        chat_history: fields
            .get("chat_history")
            .map(|v| v.as_array().iter().filter_map(message_from_value).collect())
            .unwrap_or_default(),
    }
}

/// Encodes a patch as the fields to write plus the update mask naming
/// exactly those fields. Firestore merges: masked fields are replaced,
/// everything else is preserved.
fn fields_from_patch(patch: &UserPatch) -> (BTreeMap<String, Value>, Vec<&'static str>) {
    let mut fields = BTreeMap::new();
    let mut mask = Vec::new();
    if let Some(tokens) = patch.tokens {
        fields.insert("tokens".to_string(), Value::integer(tokens));
        mask.push("tokens");
    }
    if let Some(preferences) = &patch.preferences {
        fields.insert(
            "learning_preferences".to_string(),
            preferences_value(preferences),
        );
        mask.push("learning_preferences");
    }
    if let Some(subjects) = &patch.subjects {
        fields.insert("subjects".to_string(), subjects_value(subjects));
        mask.push("subjects");
    }
    if let Some(chat_history) = &patch.chat_history {
        fields.insert("chat_history".to_string(), chat_history_value(chat_history));
        mask.push("chat_history");
    }
    (fields, mask)
}

//=========================================================================================
// `UserStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserStore for FirestoreAdapter {
    async fn get(&self, username: &str) -> PortResult<Option<UserProfile>> {
        let bearer = self.bearer().await?;
        let response = self
            .http
            .get(self.document_url(username))
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "Firestore get failed with status {}",
                response.status()
            )));
        }

        let document: FirestoreDocument = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Some(profile_from_fields(&document.fields)))
    }

    async fn create(&self, profile: &UserProfile) -> PortResult<()> {
        let bearer = self.bearer().await?;
        let document = FirestoreDocument {
            name: None,
            fields: fields_from_profile(profile),
        };
        let response = self
            .http
            .post(self.collection_url())
            .query(&[("documentId", profile.username.as_str())])
            .bearer_auth(bearer)
            .json(&document)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Firestore refuses a duplicate documentId, leaving the existing
        // record untouched.
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(PortError::AlreadyExists(profile.username.clone()));
        }
        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "Firestore create failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn update(&self, username: &str, patch: &UserPatch) -> PortResult<()> {
        let (fields, mask) = fields_from_patch(patch);
        if mask.is_empty() {
            return Ok(());
        }

        let bearer = self.bearer().await?;
        let mask_pairs: Vec<(&str, &str)> = mask
            .iter()
            .map(|field| ("updateMask.fieldPaths", *field))
            .collect();
        let document = FirestoreDocument { name: None, fields };

        let response = self
            .http
            .patch(self.document_url(username))
            .query(&mask_pairs)
            .bearer_auth(bearer)
            .json(&document)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PortError::NotFound(username.to_string()));
        }
        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "Firestore update failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> UserProfile {
        let mut profile = UserProfile::new_registration(
            "alice".into(),
            "Alice".into(),
            "Smith".into(),
            "alice@example.com".into(),
            "$argon2id$fake".into(),
        );
        profile.tokens = 950;
        profile.subjects = vec!["Mathematics".into(), "Physics".into()];
        profile.chat_history = vec![
            ChatMessage::system("prompt"),
            ChatMessage::assistant("hello"),
            ChatMessage::image("https://img.example/1.png"),
        ];
        profile
    }

    #[test]
    fn profile_round_trips_through_wire_encoding() {
        let profile = sample_profile();
        let decoded = profile_from_fields(&fields_from_profile(&profile));
        assert_eq!(decoded, profile);
    }

    #[test]
    fn wire_json_uses_firestore_value_shapes() {
        let fields = fields_from_profile(&sample_profile());
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["tokens"]["integerValue"], "950");
        assert_eq!(json["email"]["stringValue"], "alice@example.com");
        assert_eq!(
            json["chat_history"]["arrayValue"]["values"][0]["mapValue"]["fields"]["role"]
                ["stringValue"],
            "system"
        );
    }

    #[test]
    fn patch_mask_names_exactly_the_present_fields() {
        let patch = UserPatch {
            tokens: Some(900),
            chat_history: Some(vec![ChatMessage::user("hi")]),
            ..Default::default()
        };
        let (fields, mask) = fields_from_patch(&patch);
        assert_eq!(mask, vec!["tokens", "chat_history"]);
        assert!(fields.contains_key("tokens"));
        assert!(fields.contains_key("chat_history"));
        assert!(!fields.contains_key("subjects"));
    }

    #[test]
    fn unknown_roles_and_preferences_are_tolerated() {
        let mut fields = fields_from_profile(&sample_profile());
        let mut bogus = BTreeMap::new();
        bogus.insert("role".to_string(), Value::string("moderator"));
        bogus.insert("content".to_string(), Value::string("?"));
        fields.insert(
            "chat_history".to_string(),
            Value::array(vec![Value::map(bogus), message_value(&ChatMessage::user("hi"))]),
        );
        let mut prefs = BTreeMap::new();
        prefs.insert("style".to_string(), Value::string("telepathic"));
        fields.insert("learning_preferences".to_string(), Value::map(prefs));

        let decoded = profile_from_fields(&fields);
        assert_eq!(decoded.chat_history, vec![ChatMessage::user("hi")]);
        assert_eq!(decoded.preferences, LearningPreferences::default());
    }

    #[test]
    fn empty_array_omits_values_on_the_wire() {
        let json = serde_json::to_value(subjects_value(&[])).unwrap();
        assert_eq!(json, serde_json::json!({ "arrayValue": {} }));
        let decoded: Value = serde_json::from_value(json).unwrap();
        assert!(decoded.as_array().is_empty());
    }
}
