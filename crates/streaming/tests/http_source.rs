use std::net::SocketAddr;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use foundation::FrameRange;
use serde::Deserialize;
use streaming::protocol::{FramesRequest, WireFrame};
use streaming::{Annotation, EncodedFrame, FrameSource, HttpFrameSource, VideoMetadata};

#[derive(Deserialize)]
struct RangeQuery {
    start: u32,
    end: u32,
}

fn annotations() -> Vec<Annotation> {
    vec![
        Annotation {
            id: 1,
            start_frame: 0,
            end_frame: 9,
            state: "reviewed".into(),
            pending: false,
        },
        Annotation {
            id: 2,
            start_frame: 40,
            end_frame: 55,
            state: "flagged".into(),
            pending: false,
        },
    ]
}

async fn metadata() -> Json<VideoMetadata> {
    Json(VideoMetadata {
        total_frames: 120,
        width: 640,
        height: 360,
    })
}

async fn frames(Json(req): Json<FramesRequest>) -> Json<Vec<WireFrame>> {
    // Frames past the end are left out, like the real service.
    let wire = req
        .indices
        .into_iter()
        .filter(|i| *i < 120)
        .map(|frame_index| {
            WireFrame::encode(&EncodedFrame {
                frame_index,
                bytes: format!("still-{frame_index}").into_bytes(),
            })
        })
        .collect();
    Json(wire)
}

async fn list_annotations(Query(q): Query<RangeQuery>) -> Json<Vec<Annotation>> {
    let range = FrameRange::new(q.start, q.end);
    Json(annotations().into_iter().filter(|a| a.range().overlaps(&range)).collect())
}

async fn unavailable() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance")
}

async fn garbage() -> Json<serde_json::Value> {
    Json(serde_json::json!([{ "frame_index": 1, "data": "%%%not-base64%%%" }]))
}

async fn spawn_server() -> SocketAddr {
    let app = Router::new()
        .route("/video/metadata", get(metadata))
        .route("/video/frames", post(frames))
        .route("/video/annotations", get(list_annotations))
        .route("/down/metadata", get(unavailable))
        .route("/down/frames", post(unavailable))
        .route("/garbled/frames", post(garbage));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn reads_metadata() {
    let addr = spawn_server().await;
    let source = HttpFrameSource::new(format!("http://{addr}/video/"));
    let meta = source.metadata().await.unwrap();
    assert_eq!(meta.total_frames, 120);
    assert_eq!((meta.width, meta.height), (640, 360));
}

#[tokio::test]
async fn fetches_frame_batches() {
    let addr = spawn_server().await;
    let source = HttpFrameSource::new(format!("http://{addr}/video"));
    let frames = source.fetch_frames(vec![0, 32, 64, 96, 128]).await.unwrap();

    let indices: Vec<u32> = frames.iter().map(|f| f.frame_index).collect();
    assert_eq!(indices, vec![0, 32, 64, 96]);
    assert_eq!(frames[1].bytes, b"still-32".to_vec());
}

#[tokio::test]
async fn fetches_annotations_in_range() {
    let addr = spawn_server().await;
    let source = HttpFrameSource::new(format!("http://{addr}/video"));
    let found = source.fetch_annotations(FrameRange::new(30, 45)).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, 2);
    assert_eq!(found[0].state, "flagged");
}

#[tokio::test]
async fn error_status_is_a_source_error() {
    let addr = spawn_server().await;
    let source = HttpFrameSource::new(format!("http://{addr}/down"));

    let err = source.metadata().await.unwrap_err();
    assert!(err.to_string().contains("503"), "{err}");
    assert!(std::error::Error::source(&err).is_some());

    assert!(source.fetch_frames(vec![1]).await.is_err());
}

#[tokio::test]
async fn bad_payload_is_a_source_error() {
    let addr = spawn_server().await;
    let source = HttpFrameSource::new(format!("http://{addr}/garbled"));
    let err = source.fetch_frames(vec![1]).await.unwrap_err();
    assert!(err.to_string().contains("frame 1"), "{err}");
}

#[tokio::test]
async fn unreachable_service_is_a_source_error() {
    let source = HttpFrameSource::new("http://127.0.0.1:9");
    assert!(source.metadata().await.is_err());
}
