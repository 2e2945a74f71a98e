//! Client and cache for the remote label-list API.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};
use web_time::Instant;

use crate::config::PacsConfig;
use crate::http::{HttpError, HttpMethod, HttpRequest, HttpTransport};

#[derive(Debug, Error)]
pub enum LabelApiError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Label list response is missing {0}")]
    MissingField(&'static str),

    #[error("Invalid label record: {0}")]
    InvalidRecord(#[from] serde_json::Error),

    #[error("Label {0} is not in the cached list")]
    UnknownLabel(LabelId),
}

/// Server-assigned label id. The API returns either numbers or strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LabelId(pub String);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for LabelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LabelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }
        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => LabelId(n.to_string()),
            RawId::Text(s) => LabelId(s),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LabelId>,
    #[serde(default)]
    pub no: u32,
    #[serde(alias = "labellist")]
    pub name: String,
    pub color: String,
    #[serde(rename = "type")]
    pub kind: String,
}

pub struct LabelListClient {
    transport: Arc<dyn HttpTransport>,
    config: PacsConfig,
}

impl LabelListClient {
    pub fn new(transport: Arc<dyn HttpTransport>, config: PacsConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &PacsConfig {
        &self.config
    }

    /// `GET <list>?type=<kind>`, unwrapping `response.label_list`.
    pub async fn fetch(&self, kind: &str) -> Result<Vec<LabelRecord>, LabelApiError> {
        let request = HttpRequest::get(self.config.list_url()).query("type", kind);
        let response = self.transport.execute(request).await?;
        let list = response
            .body
            .as_ref()
            .and_then(|body| body.get("response"))
            .and_then(|body| body.get("label_list"))
            .cloned()
            .ok_or(LabelApiError::MissingField("response.label_list"))?;
        Ok(serde_json::from_value(list)?)
    }

    pub async fn add(&self, record: &LabelRecord) -> Result<Option<LabelRecord>, LabelApiError> {
        self.send(HttpMethod::Post, self.config.add_url(), record).await
    }

    pub async fn update(&self, record: &LabelRecord) -> Result<Option<LabelRecord>, LabelApiError> {
        self.send(HttpMethod::Patch, self.config.update_url(), record)
            .await
    }

    /// `DELETE <delete>/<id>`.
    pub async fn delete(&self, id: &LabelId) -> Result<(), LabelApiError> {
        let url = format!("{}/{}", self.config.delete_url().trim_end_matches('/'), id);
        self.transport
            .execute(HttpRequest::new(HttpMethod::Delete, url))
            .await?;
        Ok(())
    }

    /// Post an exported labelmap buffer to the label list endpoint.
    pub async fn save_array_map(&self, payload: Value) -> Result<(), LabelApiError> {
        let request = HttpRequest::new(HttpMethod::Post, self.config.list_url()).json(payload);
        self.transport.execute(request).await?;
        Ok(())
    }

    /// Send a record and return the server's copy when it echoes one back.
    async fn send(
        &self,
        method: HttpMethod,
        url: String,
        record: &LabelRecord,
    ) -> Result<Option<LabelRecord>, LabelApiError> {
        let request = HttpRequest::new(method, url).json(serde_json::to_value(record)?);
        let response = self.transport.execute(request).await?;
        let echoed = response
            .body
            .as_ref()
            .map(|body| body.get("response").unwrap_or(body))
            .filter(|body| body.get("name").is_some() || body.get("labellist").is_some())
            .cloned();
        Ok(match echoed {
            Some(body) => Some(serde_json::from_value(body)?),
            None => None,
        })
    }
}

/// The last fetched label list, refreshed explicitly.
pub struct LabelListStore {
    client: LabelListClient,
    labels: Vec<LabelRecord>,
    last_refreshed: Option<Instant>,
}

impl LabelListStore {
    pub const DEFAULT_COLOR: &'static str = "#ff0000";

    pub fn new(client: LabelListClient) -> Self {
        Self {
            client,
            labels: Vec::new(),
            last_refreshed: None,
        }
    }

    pub fn labels(&self) -> &[LabelRecord] {
        &self.labels
    }

    pub fn last_refreshed(&self) -> Option<Instant> {
        self.last_refreshed
    }

    /// Replace the cached list with the server's. The cache is left as it
    /// was when the fetch fails.
    pub async fn refresh(&mut self) -> Result<&[LabelRecord], LabelApiError> {
        let kind = self.client.config().label_type.clone();
        match self.client.fetch(&kind).await {
            Ok(labels) => {
                info!(count = labels.len(), "Label list refreshed");
                self.labels = labels;
                self.last_refreshed = Some(Instant::now());
                Ok(self.labels.as_slice())
            }
            Err(err) => {
                warn!(%err, "Label list refresh failed");
                Err(err)
            }
        }
    }

    /// Create `Segmentation <n>` where `n` is the current list length.
    pub async fn create_label(&mut self) -> Result<LabelRecord, LabelApiError> {
        let no = self.labels.len() as u32;
        let record = LabelRecord {
            id: None,
            no,
            name: format!("Segmentation {no}"),
            color: Self::DEFAULT_COLOR.to_string(),
            kind: self.client.config().label_type.clone(),
        };
        let created = match self.client.add(&record).await {
            Ok(created) => created.unwrap_or(record),
            Err(err) => {
                warn!(%err, "Label creation failed");
                return Err(err);
            }
        };
        self.labels.push(created.clone());
        Ok(created)
    }

    pub async fn update_label(&mut self, record: LabelRecord) -> Result<(), LabelApiError> {
        let id = record.id.clone().ok_or(LabelApiError::MissingField("id"))?;
        let position = self
            .labels
            .iter()
            .position(|label| label.id.as_ref() == Some(&id))
            .ok_or_else(|| LabelApiError::UnknownLabel(id.clone()))?;
        let updated = self.client.update(&record).await?.unwrap_or(record);
        self.labels[position] = updated;
        Ok(())
    }

    pub async fn remove(&mut self, id: &LabelId) -> Result<LabelRecord, LabelApiError> {
        let position = self
            .labels
            .iter()
            .position(|label| label.id.as_ref() == Some(id))
            .ok_or_else(|| LabelApiError::UnknownLabel(id.clone()))?;
        if let Err(err) = self.client.delete(id).await {
            warn!(%err, %id, "Label deletion failed");
            return Err(err);
        }
        Ok(self.labels.remove(position))
    }
}

pub fn labelmap_payload(labelmap_text: &str, name: &str) -> Value {
    json!({
        "name": name,
        "type": "labelmap",
        "buffer": labelmap_text,
    })
}
