//! People records replicated from the pessoa service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ReplicaDto, ReplicaRecord};

/// Person as published on `pessoa.saved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonDto {
    pub id: String,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PersonDto {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            updated_at: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }
}

impl ReplicaDto for PersonDto {
    fn identifier(&self) -> &str {
        &self.id
    }

    fn version(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

/// Local replica row for a person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonRecord {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&PersonDto> for PersonRecord {
    fn from(dto: &PersonDto) -> Self {
        Self {
            id: dto.id.clone(),
            name: dto.name.clone(),
            email: dto.email.clone(),
            updated_at: dto.updated_at,
        }
    }
}

impl ReplicaRecord<PersonDto> for PersonRecord {
    fn version(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn reflects(&self, dto: &PersonDto) -> bool {
        self.name == dto.name && self.email == dto.email && self.updated_at == dto.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dto_wire_format() {
        let dto: PersonDto = serde_json::from_str(r#"{"id":"42","nome":"Ana"}"#).unwrap();
        assert_eq!(dto, PersonDto::new("42", "Ana"));

        let encoded = serde_json::to_string(&dto).unwrap();
        assert_eq!(encoded, r#"{"id":"42","nome":"Ana"}"#);
    }

    #[test]
    fn test_dto_with_version() {
        let dto: PersonDto = serde_json::from_str(
            r#"{"id":"42","nome":"Ana","email":"ana@example.com","updated_at":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(dto.email.as_deref(), Some("ana@example.com"));
        assert!(dto.version().is_some());
    }

    #[test]
    fn test_record_reflects_dto() {
        let dto = PersonDto::new("42", "Ana");
        let record = PersonRecord::from(&dto);
        assert!(record.reflects(&dto));
        assert!(!record.reflects(&PersonDto::new("42", "Ana Maria")));
    }
}
