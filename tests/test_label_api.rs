mod common;

use mpr_sync::config::PacsConfig;
use mpr_sync::http::{HttpError, HttpMethod};
use mpr_sync::label_api::{
    LabelApiError, LabelId, LabelListClient, LabelListStore, LabelRecord, labelmap_payload,
};
use serde_json::json;

use common::RecordingTransport;

fn pacs() -> PacsConfig {
    PacsConfig {
        host: "http://pacs".to_string(),
        labellist_delete: Some("/api/v1/labeling/delete".to_string()),
        ..PacsConfig::default()
    }
}

fn label_list() -> serde_json::Value {
    json!({
        "response": {
            "label_list": [
                { "id": 11, "no": 0, "labellist": "Liver", "color": "#00ff00", "type": "nifti" },
                { "id": "a-12", "no": 1, "name": "Spleen", "color": "#0000ff", "type": "nifti" }
            ]
        }
    })
}

#[tokio::test]
async fn test_fetch_sends_type_query_and_unwraps_list() {
    let transport = RecordingTransport::new();
    transport.respond_json(label_list());
    let client = LabelListClient::new(transport.clone(), pacs());

    let labels = client.fetch("nifti").await.unwrap();

    assert_eq!(labels.len(), 2);
    assert_eq!(labels[0].id, Some(LabelId("11".to_string())));
    assert_eq!(labels[0].name, "Liver");
    assert_eq!(labels[1].id, Some(LabelId("a-12".to_string())));

    let requests = transport.requests();
    assert_eq!(requests[0].method, HttpMethod::Get);
    assert_eq!(requests[0].url, "http://pacs/api/v1/labeling");
    assert_eq!(
        requests[0].query,
        vec![("type".to_string(), "nifti".to_string())]
    );
}

#[tokio::test]
async fn test_fetch_without_label_list_is_an_error() {
    let transport = RecordingTransport::new();
    transport.respond_json(json!({ "response": {} }));
    let client = LabelListClient::new(transport, pacs());

    let err = client.fetch("nifti").await.unwrap_err();

    assert!(matches!(err, LabelApiError::MissingField(_)));
}

#[tokio::test]
async fn test_refresh_then_create_label() {
    let transport = RecordingTransport::new();
    transport.respond_json(label_list());
    transport.respond_empty();
    let mut store = LabelListStore::new(LabelListClient::new(transport.clone(), pacs()));
    assert!(store.last_refreshed().is_none());

    store.refresh().await.unwrap();
    let created = store.create_label().await.unwrap();

    assert!(store.last_refreshed().is_some());
    assert_eq!(created.name, "Segmentation 2");
    assert_eq!(created.no, 2);
    assert_eq!(created.color, "#ff0000");
    assert_eq!(created.kind, "nifti");
    assert_eq!(store.labels().len(), 3);

    let post = &transport.requests()[1];
    assert_eq!(post.method, HttpMethod::Post);
    assert_eq!(
        post.body,
        Some(json!({
            "no": 2,
            "name": "Segmentation 2",
            "color": "#ff0000",
            "type": "nifti"
        }))
    );
}

#[tokio::test]
async fn test_created_label_uses_server_copy() {
    let transport = RecordingTransport::new();
    transport.respond_json(json!({
        "response": { "id": 99, "no": 0, "name": "Segmentation 0", "color": "#ff0000", "type": "nifti" }
    }));
    let mut store = LabelListStore::new(LabelListClient::new(transport, pacs()));

    let created = store.create_label().await.unwrap();

    assert_eq!(created.id, Some(LabelId("99".to_string())));
}

#[tokio::test]
async fn test_failed_refresh_keeps_cache() {
    let transport = RecordingTransport::new();
    transport.respond_json(label_list());
    transport.respond_error(HttpError::Status {
        method: HttpMethod::Get,
        url: "http://pacs/api/v1/labeling".to_string(),
        status: 503,
    });
    let mut store = LabelListStore::new(LabelListClient::new(transport, pacs()));
    store.refresh().await.unwrap();
    let refreshed_at = store.last_refreshed();

    let err = store.refresh().await.unwrap_err();

    assert!(matches!(
        err,
        LabelApiError::Http(HttpError::Status { status: 503, .. })
    ));
    assert_eq!(store.labels().len(), 2);
    assert_eq!(store.last_refreshed(), refreshed_at);
}

#[tokio::test]
async fn test_remove_deletes_by_id() {
    let transport = RecordingTransport::new();
    transport.respond_json(label_list());
    let mut store = LabelListStore::new(LabelListClient::new(transport.clone(), pacs()));
    store.refresh().await.unwrap();

    let removed = store.remove(&LabelId("11".to_string())).await.unwrap();

    assert_eq!(removed.name, "Liver");
    assert_eq!(store.labels().len(), 1);
    let delete = &transport.requests()[1];
    assert_eq!(delete.method, HttpMethod::Delete);
    assert_eq!(delete.url, "http://pacs/api/v1/labeling/delete/11");
}

#[tokio::test]
async fn test_remove_unknown_label_sends_nothing() {
    let transport = RecordingTransport::new();
    let mut store = LabelListStore::new(LabelListClient::new(transport.clone(), pacs()));

    let err = store.remove(&LabelId("404".to_string())).await.unwrap_err();

    assert!(matches!(err, LabelApiError::UnknownLabel(_)));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_update_patches_record() {
    let transport = RecordingTransport::new();
    transport.respond_json(label_list());
    let mut store = LabelListStore::new(LabelListClient::new(transport.clone(), pacs()));
    store.refresh().await.unwrap();

    let mut record: LabelRecord = store.labels()[1].clone();
    record.color = "#123456".to_string();
    store.update_label(record).await.unwrap();

    assert_eq!(store.labels()[1].color, "#123456");
    assert_eq!(transport.requests()[1].method, HttpMethod::Patch);
}

#[tokio::test]
async fn test_save_array_map_posts_payload() {
    let transport = RecordingTransport::new();
    let client = LabelListClient::new(transport.clone(), pacs());

    client
        .save_array_map(labelmap_payload("0,0,1,0", "liver"))
        .await
        .unwrap();

    let request = &transport.requests()[0];
    assert_eq!(request.method, HttpMethod::Post);
    assert_eq!(request.url, "http://pacs/api/v1/labeling");
    assert_eq!(request.body.as_ref().unwrap()["buffer"], "0,0,1,0");
}
