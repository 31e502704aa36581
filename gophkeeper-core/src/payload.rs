//! Typed payload encoding: the inner plaintext a client seals into the
//! envelope. The server only ever sees the sealed bytes.

use prost::Message;

use crate::error::{CoreError, Result};
use crate::proto::{CardData, DataResource, DataType, PasswordData};

/// A card record as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRecord {
    pub name: String,
    pub number: String,
    pub holder: String,
    pub expiry_date: String,
    pub security_code: Option<String>,
}

/// A login/password record as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub username: String,
    pub password: String,
    pub uri: String,
    pub description: Option<String>,
}

/// The tagged inner plaintext of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedPayload {
    Binary { name: String, bytes: Vec<u8> },
    Card(CardRecord),
    Credentials(CredentialRecord),
}

impl TypedPayload {
    /// Serialize the payload for sealing.
    pub fn encode(&self) -> Vec<u8> {
        let resource = match self {
            TypedPayload::Binary { name, bytes } => DataResource {
                r#type: Some(DataType::Binary as i32),
                name: Some(name.clone()),
                data: bytes.clone(),
            },
            TypedPayload::Card(card) => {
                let inner = CardData {
                    number: Some(card.number.clone()),
                    cardholder: Some(card.holder.clone()),
                    expiry_date: Some(card.expiry_date.clone()),
                    security_code: card.security_code.clone(),
                };
                DataResource {
                    r#type: Some(DataType::CardCredentials as i32),
                    name: Some(card.name.clone()),
                    data: inner.encode_to_vec(),
                }
            }
            TypedPayload::Credentials(cred) => {
                let inner = PasswordData {
                    username: Some(cred.username.clone()),
                    password: Some(cred.password.clone()),
                    uri: Some(cred.uri.clone()),
                    description: cred.description.clone(),
                };
                DataResource {
                    r#type: Some(DataType::Credentials as i32),
                    name: None,
                    data: inner.encode_to_vec(),
                }
            }
        };

        resource.encode_to_vec()
    }

    /// Parse a decrypted payload back into its typed form.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let resource = DataResource::decode(bytes)
            .map_err(|e| CoreError::Payload(format!("bad data resource: {e}")))?;

        let kind = DataType::try_from(resource.r#type.unwrap_or_default())
            .map_err(|_| CoreError::Payload("unknown data type".to_string()))?;

        match kind {
            DataType::Binary => Ok(TypedPayload::Binary {
                name: resource.name.unwrap_or_default(),
                bytes: resource.data,
            }),
            DataType::CardCredentials => {
                let inner = CardData::decode(resource.data.as_slice())
                    .map_err(|e| CoreError::Payload(format!("bad card data: {e}")))?;
                Ok(TypedPayload::Card(CardRecord {
                    name: resource.name.unwrap_or_default(),
                    number: inner.number.unwrap_or_default(),
                    holder: inner.cardholder.unwrap_or_default(),
                    expiry_date: inner.expiry_date.unwrap_or_default(),
                    security_code: inner.security_code,
                }))
            }
            DataType::Credentials => {
                let inner = PasswordData::decode(resource.data.as_slice())
                    .map_err(|e| CoreError::Payload(format!("bad credential data: {e}")))?;
                Ok(TypedPayload::Credentials(CredentialRecord {
                    username: inner.username.unwrap_or_default(),
                    password: inner.password.unwrap_or_default(),
                    uri: inner.uri.unwrap_or_default(),
                    description: inner.description,
                }))
            }
            DataType::Unspecified => {
                Err(CoreError::Payload("payload type is unspecified".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_roundtrip() {
        let payload = TypedPayload::Binary {
            name: "notes.txt".to_string(),
            bytes: vec![1, 2, 3, 4, 5],
        };
        let decoded = TypedPayload::decode(&payload.encode()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_card_roundtrip() {
        let payload = TypedPayload::Card(CardRecord {
            name: "Test".to_string(),
            number: "5555 5555 5555 5555".to_string(),
            holder: "Jane Doe".to_string(),
            expiry_date: "11/22".to_string(),
            security_code: Some("111".to_string()),
        });
        let decoded = TypedPayload::decode(&payload.encode()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_card_without_security_code() {
        let payload = TypedPayload::Card(CardRecord {
            name: "Bare".to_string(),
            number: "4111".to_string(),
            holder: "J".to_string(),
            expiry_date: "01/30".to_string(),
            security_code: None,
        });
        match TypedPayload::decode(&payload.encode()).unwrap() {
            TypedPayload::Card(card) => assert_eq!(card.security_code, None),
            other => panic!("expected card, got {other:?}"),
        }
    }

    #[test]
    fn test_credentials_roundtrip() {
        let payload = TypedPayload::Credentials(CredentialRecord {
            username: "uu1".to_string(),
            password: "sjksjs".to_string(),
            uri: "snshjs".to_string(),
            description: Some("d".to_string()),
        });
        let decoded = TypedPayload::decode(&payload.encode()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(TypedPayload::decode(&[0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_decode_unspecified_type() {
        let resource = DataResource {
            r#type: None,
            name: None,
            data: vec![],
        };
        assert!(TypedPayload::decode(&resource.encode_to_vec()).is_err());
    }
}
