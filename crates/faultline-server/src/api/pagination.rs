use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::IntoParams;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// 每页条数（默认 20）
    #[param(required = false)]
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    pub limit: Option<u64>,
    /// 偏移量（默认 0）
    #[param(required = false)]
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    pub offset: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum U64Input {
    Number(u64),
    Text(String),
}

/// Query strings hand everything over as text; accept both `limit=20`
/// and a literal number when the params arrive through a JSON body.
pub fn deserialize_optional_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<U64Input>::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(U64Input::Number(number)) => Ok(Some(number)),
        Some(U64Input::Text(text)) => text
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(DeError::custom),
    }
}

const MAX_PAGE_LIMIT: u64 = 1000;

impl PaginationParams {
    pub fn limit(&self) -> usize {
        Self::resolve_limit(self.limit)
    }

    pub fn offset(&self) -> usize {
        Self::resolve_offset(self.offset)
    }

    /// Shared clamping for handlers that carry limit/offset inside a
    /// larger filter struct instead of a `PaginationParams`.
    pub fn resolve_limit(limit: Option<u64>) -> usize {
        limit.unwrap_or(20).min(MAX_PAGE_LIMIT) as usize
    }

    pub fn resolve_offset(offset: Option<u64>) -> usize {
        offset.unwrap_or(0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_numbers_and_numeric_text() {
        let p: PaginationParams = serde_json::from_str(r#"{"limit": 50, "offset": "10"}"#).unwrap();
        assert_eq!(p.limit(), 50);
        assert_eq!(p.offset(), 10);

        let p: PaginationParams = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(p.limit(), 20);
        assert_eq!(p.offset(), 0);

        assert!(serde_json::from_str::<PaginationParams>(r#"{"limit": "abc"}"#).is_err());
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(PaginationParams::resolve_limit(Some(10_000)), 1000);
        assert_eq!(PaginationParams::resolve_limit(None), 20);
        assert_eq!(PaginationParams::resolve_offset(None), 0);
    }
}
