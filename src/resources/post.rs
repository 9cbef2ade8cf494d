use serde::{Deserialize, Serialize};

use super::Resource;

/// A post. `user_id` references a user; nothing checks that it exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Post {
    pub fn new(user_id: i64, title: &str, body: &str) -> Self {
        Self {
            user_id: Some(user_id),
            title: Some(title.to_string()),
            body: Some(body.to_string()),
            ..Self::default()
        }
    }
}

impl Resource for Post {
    const ENDPOINT: &'static str = "/posts";
    const NAME: &'static str = "post";

    fn id(&self) -> Option<i64> {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_wire_name() {
        let post = Post::new(3, "title", "body");
        let wire = serde_json::to_string(&post).unwrap();
        assert_eq!(wire, r#"{"userId":3,"title":"title","body":"body"}"#);

        let back: Post = serde_json::from_str(r#"{"id":101,"userId":3,"title":"title","body":"body"}"#).unwrap();
        assert_eq!(back.id, Some(101));
        assert_eq!(back.user_id, Some(3));
    }
}
