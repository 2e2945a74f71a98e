//! Resolve a study into WADO-URI image ids via DICOMweb metadata.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dicom::core::Tag;
use dicom_dictionary_std::tags;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::http::{HttpError, HttpRequest, HttpTransport};

#[derive(Debug, Error)]
pub enum StudyError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Instance {instance} has no value for tag {tag}")]
    MissingTag { tag: String, instance: usize },

    #[error("Unexpected metadata response: {0}")]
    UnexpectedResponse(String),
}

/// One instance of a DICOM JSON metadata response, keyed by `GGGGEEEE`.
pub type InstanceMetadata = Map<String, Value>;

#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn study_metadata(&self, study_uid: &str) -> Result<Vec<InstanceMetadata>, StudyError>;
}

/// WADO-RS metadata over an [`HttpTransport`].
pub struct DicomWebClient {
    rs_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl DicomWebClient {
    pub fn new(rs_url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            rs_url: rs_url.into(),
            transport,
        }
    }
}

#[async_trait]
impl MetadataClient for DicomWebClient {
    async fn study_metadata(&self, study_uid: &str) -> Result<Vec<InstanceMetadata>, StudyError> {
        let url = format!("{}/studies/{}/metadata", self.rs_url, study_uid);
        let response = self.transport.execute(HttpRequest::get(url)).await?;
        match response.body {
            Some(Value::Array(instances)) => instances
                .into_iter()
                .map(|instance| match instance {
                    Value::Object(map) => Ok(map),
                    other => Err(StudyError::UnexpectedResponse(format!(
                        "instance is not an object: {other}"
                    ))),
                })
                .collect(),
            Some(other) => Err(StudyError::UnexpectedResponse(format!(
                "expected an array, found {other}"
            ))),
            None => Ok(Vec::new()),
        }
    }
}

/// Instance metadata keyed by image id.
#[derive(Debug, Default)]
pub struct MetadataManager {
    instances: RwLock<HashMap<String, InstanceMetadata>>,
}

impl MetadataManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, image_id: impl Into<String>, metadata: InstanceMetadata) {
        self.instances.write().insert(image_id.into(), metadata);
    }

    pub fn get(&self, image_id: &str) -> Option<InstanceMetadata> {
        self.instances.read().get(image_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}

/// `GGGGEEEE`, the key DICOM JSON uses for a tag.
pub fn tag_key(tag: Tag) -> String {
    format!("{:04X}{:04X}", tag.group(), tag.element())
}

/// First string value of a tag, if present.
pub fn first_string(metadata: &InstanceMetadata, tag: Tag) -> Option<&str> {
    metadata
        .get(&tag_key(tag))?
        .get("Value")?
        .get(0)?
        .as_str()
}

/// Fetch a study's metadata and build one WADO-URI image id per instance,
/// in the order the server lists them.
pub async fn create_study_image_ids(
    client: &dyn MetadataClient,
    wado_uri_url: &str,
    study_uid: &str,
    manager: &MetadataManager,
) -> Result<Vec<String>, StudyError> {
    let instances = client.study_metadata(study_uid).await?;
    let mut image_ids = Vec::with_capacity(instances.len());

    for (instance, metadata) in instances.into_iter().enumerate() {
        let series_uid = required(&metadata, tags::SERIES_INSTANCE_UID, instance)?;
        let sop_uid = required(&metadata, tags::SOP_INSTANCE_UID, instance)?;
        let image_id = format!(
            "wadouri:{wado_uri_url}&studyUID={study_uid}&seriesUID={series_uid}\
             &objectUID={sop_uid}&contentType=application/dicom"
        );
        manager.add(image_id.clone(), metadata);
        image_ids.push(image_id);
    }

    info!(study_uid, instances = image_ids.len(), "Study image ids created");
    Ok(image_ids)
}

fn required(metadata: &InstanceMetadata, tag: Tag, instance: usize) -> Result<String, StudyError> {
    first_string(metadata, tag)
        .map(str::to_string)
        .ok_or_else(|| StudyError::MissingTag {
            tag: tag_key(tag),
            instance,
        })
}

/// Image ids belonging to one series.
pub fn filter_series<'a>(image_ids: &'a [String], series_uid: &str) -> Vec<&'a str> {
    let needle = format!("&seriesUID={series_uid}&");
    let matching: Vec<&str> = image_ids
        .iter()
        .map(String::as_str)
        .filter(|id| id.contains(&needle))
        .collect();
    debug!(series_uid, matching = matching.len(), "Series filtered");
    matching
}
