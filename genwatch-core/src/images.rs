use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SelectedCaptions {
    #[serde(rename = "selectedCaptions", default)]
    pub selected_captions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ImageListEntry {
    pub name: String,
    /// Prompt recovered from the file name, with the trailing
    /// `_<suffix>` removed and underscores turned back into spaces.
    pub prompt: String,
    pub path: String,
    /// Creation time in milliseconds since the unix epoch.
    pub created_at: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClearImagesResponse {
    pub deleted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_captions_use_client_field_name() {
        let parsed: SelectedCaptions =
            serde_json::from_str(r#"{"selectedCaptions": ["a beach", "a forest"]}"#).unwrap();
        assert_eq!(parsed.selected_captions, vec!["a beach", "a forest"]);

        let empty: SelectedCaptions = serde_json::from_str("{}").unwrap();
        assert!(empty.selected_captions.is_empty());
    }
}
