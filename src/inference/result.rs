use super::download::Downloader;
use super::types::{NormalizedResult, is_base64};
use crate::{Error, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value;
use tracing::{debug, warn};

/// Fields of a structured result element that can carry the image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultItem {
    pub url: Option<String>,
    pub data: Option<String>,
    pub image: Option<String>,
}

impl ResultItem {
    /// Non-object values and non-string fields carry nothing usable.
    fn from_value(value: &Value) -> Self {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            url: field("url"),
            data: field("data"),
            image: field("image"),
        }
    }
}

/// The shapes a remote `data` payload is known to take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultPayload {
    Sequence(Vec<ResultItem>),
    Single(ResultItem),
    Text(String),
    Other,
}

impl From<Value> for ResultPayload {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::Sequence(items.iter().map(ResultItem::from_value).collect()),
            Value::Object(_) => Self::Single(ResultItem::from_value(&value)),
            Value::String(text) => Self::Text(text),
            Value::Null | Value::Bool(_) | Value::Number(_) => Self::Other,
        }
    }
}

/// Reduces a [`ResultPayload`] to a single base64 image.
pub struct ResultNormalizer<'a> {
    downloader: &'a Downloader,
}

impl<'a> ResultNormalizer<'a> {
    pub fn new(downloader: &'a Downloader) -> Self {
        Self { downloader }
    }

    /// First matching shape wins. Inline fields are trusted to already be
    /// base64; fetched bytes are encoded here. The final string is checked
    /// against the base64 alphabet either way.
    pub async fn normalize(&self, payload: ResultPayload) -> Result<NormalizedResult> {
        let encoded = match payload {
            ResultPayload::Sequence(items) => {
                debug!("Result is an array with {} items", items.len());
                match items.into_iter().next() {
                    Some(ResultItem {
                        url: Some(url),
                        data,
                        ..
                    }) => match self.fetch_encoded(&url).await {
                        Ok(encoded) => encoded,
                        Err(e) => match data {
                            Some(inline) => {
                                warn!("Download of {} failed ({}), using inline data field", url, e);
                                inline
                            }
                            None => return Err(e),
                        },
                    },
                    Some(ResultItem {
                        data: Some(inline), ..
                    }) => inline,
                    Some(_) | None => return Err(Error::UnrecognizedResultShape),
                }
            }
            ResultPayload::Single(item) => match item {
                ResultItem { url: Some(url), .. } => self.fetch_encoded(&url).await?,
                ResultItem {
                    image: Some(image), ..
                } => image,
                ResultItem { .. } => return Err(Error::UnrecognizedResultShape),
            },
            ResultPayload::Text(text) if is_base64(&text) => text,
            ResultPayload::Text(text) if looks_like_url(&text) => self.fetch_encoded(&text).await?,
            ResultPayload::Text(_) | ResultPayload::Other => {
                return Err(Error::UnrecognizedResultShape);
            }
        };

        NormalizedResult::new(encoded)
    }

    async fn fetch_encoded(&self, url: &str) -> Result<String> {
        let bytes = self.downloader.fetch(url).await?;
        Ok(STANDARD.encode(bytes))
    }
}

fn looks_like_url(text: &str) -> bool {
    text.starts_with("http://") || text.starts_with("https://")
}
