use serde::{Deserialize, Deserializer};

/// Accepts either a list, or a single comma-separated string as env vars provide it.
/// Blank entries are dropped, so `""` becomes an empty list.
pub fn deserialize_vec_string<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        Joined(String),
        List(Vec<String>),
    }

    let items = match StringOrVec::deserialize(deserializer)? {
        StringOrVec::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        StringOrVec::List(list) => list,
    };

    Ok(items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect())
}

/// Accepts a string or an integer, keeping integers in their decimal form
pub fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Text(text) => text,
        StringOrNumber::Signed(n) => n.to_string(),
        StringOrNumber::Unsigned(n) => n.to_string(),
    })
}
