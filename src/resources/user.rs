use serde::{Deserialize, Serialize};

use super::Resource;

/// A user record. Unknown wire fields are ignored on decode; unset fields
/// are omitted on encode so the same type serves as a PATCH body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<Company>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl User {
    pub fn new(name: &str, email: &str, username: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            username: Some(username.to_string()),
            ..Self::default()
        }
    }
}

impl Resource for User {
    const ENDPOINT: &'static str = "/users";
    const NAME: &'static str = "user";

    fn id(&self) -> Option<i64> {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zipcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<Geo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catch_phrase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bs: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let raw = r#"{
            "id": 1,
            "name": "Leanne Graham",
            "username": "Bret",
            "email": "Sincere@april.biz",
            "address": {"street": "Kulas Light", "geo": {"lat": "-37.3159", "lng": "81.1496"}},
            "company": {"name": "Romaguera-Crona", "catchPhrase": "Multi-layered", "bs": "harness"},
            "favouriteColour": "teal"
        }"#;
        let user: User = serde_json::from_str(raw).unwrap();
        assert_eq!(user.id, Some(1));
        assert_eq!(user.company.as_ref().unwrap().catch_phrase.as_deref(), Some("Multi-layered"));
        assert_eq!(
            user.address.as_ref().unwrap().geo.as_ref().unwrap().lng.as_deref(),
            Some("81.1496")
        );
    }

    #[test]
    fn test_encode_decode_preserves_populated_fields() {
        let mut user = User::new("Jane Doe", "jane@example.com", "jdoe");
        user.created_at = Some("2024-01-01T00:00:00Z".to_string());
        user.company = Some(Company {
            catch_phrase: Some("ship it".to_string()),
            ..Company::default()
        });

        let wire = serde_json::to_value(&user).unwrap();
        assert_eq!(wire["createdAt"], "2024-01-01T00:00:00Z");
        assert_eq!(wire["company"]["catchPhrase"], "ship it");
        assert!(wire.get("phone").is_none());

        let back: User = serde_json::from_value(wire).unwrap();
        assert_eq!(back, user);
    }
}
