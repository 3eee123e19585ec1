use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Uniform wrapper every service response conforms to, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T = Value> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub meta: Option<PageMeta>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn into_data(self) -> Option<T> {
        self.data
    }
}

/// Pagination details attached to list responses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub total_pages: i64,
}

impl PageMeta {
    pub fn has_next_page(&self) -> bool {
        self.page < self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_envelope() {
        let json = r#"{"success":true,"data":[1,2,3],"meta":{"total":23,"page":1,"limit":10,"total_pages":3}}"#;
        let resp: ApiResponse<Vec<i32>> = serde_json::from_str(json).unwrap();
        assert!(resp.success);
        assert_eq!(resp.data.as_deref(), Some(&[1, 2, 3][..]));
        let meta = resp.meta.unwrap();
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next_page());
    }

    #[test]
    fn test_parse_minimal_envelope() {
        let resp: ApiResponse = serde_json::from_str(r#"{"success":true,"message":"Registration cancelled"}"#).unwrap();
        assert!(resp.data.is_none());
        assert_eq!(resp.message.as_deref(), Some("Registration cancelled"));
    }

    #[test]
    fn test_parse_empty_object() {
        let resp: ApiResponse<String> = serde_json::from_str("{}").unwrap();
        assert!(!resp.success);
        assert!(resp.into_data().is_none());
    }
}
