use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, State as AxumState},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    error::AppError,
    models::Source,
    state::State,
    utils::read_upload,
};

pub async fn puc_handler(
    AxumState(state): AxumState<Arc<State>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    info!("Request received to process image");
    let upload = read_upload(multipart, state.config.max_upload_bytes).await?;

    let report = state
        .pipeline
        .run(upload.image, upload.region.as_deref())
        .await?;

    let mut body = json!({
        "status": "success",
        "message": "Image processing done successfully",
        "response": report.outcomes,
    });

    if !report.failures.is_empty() {
        body["failures"] = json!(report.failures);
    }
    if let Some(region) = report.region {
        body["region"] = json!(region);
    }

    Ok((StatusCode::OK, Json(body)))
}

#[derive(Deserialize)]
pub struct PlateCheck {
    #[serde(default)]
    rc_number: Option<String>,
}

pub async fn plate_handler(
    AxumState(state): AxumState<Arc<State>>,
    Json(payload): Json<PlateCheck>,
) -> Result<impl IntoResponse, AppError> {
    let rc_number = payload
        .rc_number
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::MalformedPayload("RC number is required".to_string()))?;

    let outcome = state.validator.validate(&rc_number).await?;

    let message = match outcome.sourced_from {
        Source::Cache => "PUC details fetched from database",
        Source::External => "PUC details validated and saved successfully",
    };

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "message": message,
            "data": outcome,
        })),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRegion {
    #[serde(default)]
    region_name: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    state: String,
}

pub async fn create_region_handler(
    AxumState(state): AxumState<Arc<State>>,
    Json(payload): Json<NewRegion>,
) -> Result<impl IntoResponse, AppError> {
    let fields = [&payload.region_name, &payload.city, &payload.state];
    if fields.iter().any(|field| field.trim().is_empty()) {
        return Err(AppError::MalformedPayload(
            "All fields (regionName, city, state) are required".to_string(),
        ));
    }

    let snapshot = state
        .regions
        .check_and_create(payload.region_name.trim(), payload.city.trim(), payload.state.trim())
        .await?;

    let (status, message) = if snapshot.is_new_entry {
        (StatusCode::CREATED, "Region created successfully")
    } else {
        (StatusCode::OK, "Region fetched from database")
    };

    Ok((
        status,
        Json(json!({
            "status": "success",
            "message": message,
            "data": snapshot.region,
        })),
    ))
}

pub async fn regions_handler(
    AxumState(state): AxumState<Arc<State>>,
) -> Result<impl IntoResponse, AppError> {
    let overview = state.regions.overview().await?;

    Ok((StatusCode::OK, Json(overview)))
}

pub async fn region_stats_handler(
    AxumState(state): AxumState<Arc<State>>,
    Path(region_name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.regions.stats(&region_name).await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "status": "success", "data": stats })),
    ))
}

pub async fn region_vehicles_handler(
    AxumState(state): AxumState<Arc<State>>,
    Path(region_name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let vehicles = state.regions.vehicles(&region_name).await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "status": "success", "response": vehicles })),
    ))
}

pub async fn vehicle_classes_handler(
    AxumState(state): AxumState<Arc<State>>,
) -> Result<impl IntoResponse, AppError> {
    let classes = state.store.vehicle_classes().await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "success": true, "data": classes })),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use reqwest::multipart::{Form, Part};
    use serde_json::Value;
    use tokio::net::TcpListener;

    use super::*;
    use crate::{
        build_router,
        config::{Config, StoreBackend},
        fakes::{FakeRecognizer, FakeRto, FakeSegmenter},
        memory::MemoryStore,
    };

    struct TestServer {
        base: String,
        rto: Arc<FakeRto>,
    }

    async fn serve(texts: &[Option<&str>], rto: FakeRto) -> TestServer {
        let config = Config {
            store_backend: StoreBackend::Memory,
            max_upload_bytes: 1024,
            ..Config::default()
        };
        let rto = Arc::new(rto);
        let state = State::with_parts(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(FakeSegmenter::crops(texts.len())),
            Arc::new(FakeRecognizer::reading(texts)),
            rto.clone(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });

        TestServer {
            base: format!("http://{address}"),
            rto,
        }
    }

    fn photo_form(mime: &str, bytes: Vec<u8>) -> Form {
        let part = Part::bytes(bytes)
            .file_name("car.jpg")
            .mime_str(mime)
            .unwrap();

        Form::new().part("file", part)
    }

    async fn post_form(server: &TestServer, form: Form) -> (u16, Value) {
        let response = reqwest::Client::new()
            .post(format!("{}/api/puc", server.base))
            .multipart(form)
            .send()
            .await
            .unwrap();

        (response.status().as_u16(), response.json().await.unwrap())
    }

    async fn post_json(server: &TestServer, path: &str, body: Value) -> (u16, Value) {
        let response = reqwest::Client::new()
            .post(format!("{}{path}", server.base))
            .json(&body)
            .send()
            .await
            .unwrap();

        (response.status().as_u16(), response.json().await.unwrap())
    }

    async fn get(server: &TestServer, path: &str) -> (u16, Value) {
        let response = reqwest::get(format!("{}{path}", server.base)).await.unwrap();

        (response.status().as_u16(), response.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_puc_upload() {
        let server = serve(
            &[Some("MARUTI SUZUKI\nMH12AB1234"), Some("IND\n-")],
            FakeRto::valid(&["MH12AB1234"]),
        )
        .await;

        let (status, body) = post_form(&server, photo_form("image/jpeg", b"jpeg".to_vec())).await;

        assert_eq!(status, 200);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Image processing done successfully");
        assert_eq!(body["response"][0]["reg_no"], "MH12AB1234");
        assert_eq!(body["response"][0]["message"], "PUC is Valid!!");
        assert_eq!(body["response"][0]["sourced_from"], "external");
        assert!(body.get("region").is_none());
    }

    #[tokio::test]
    async fn test_puc_upload_rejections() {
        let server = serve(&[Some("MH12AB1234")], FakeRto::default()).await;

        let (status, body) = post_form(&server, Form::new().text("regionName", "east")).await;
        assert_eq!(status, 400);
        assert_eq!(body["status"], "failed");
        assert_eq!(body["error"], "File not found");

        let (status, body) =
            post_form(&server, photo_form("application/pdf", b"%PDF".to_vec())).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Invalid file type. Only images are allowed.");

        let (status, _) = post_form(&server, photo_form("image/jpeg", vec![0; 2048])).await;
        assert_eq!(status, 400);

        assert_eq!(server.rto.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_puc_upload_with_region() {
        let server = serve(&[Some("MH12AB1234")], FakeRto::valid(&["MH12AB1234"])).await;

        let (status, _) = post_json(
            &server,
            "/api/regions",
            json!({"regionName": "pune-east", "city": "Pune", "state": "MH"}),
        )
        .await;
        assert_eq!(status, 201);

        let form = photo_form("image/png", b"png".to_vec()).text("regionName", "pune-east");
        let (status, body) = post_form(&server, form).await;
        assert_eq!(status, 200);
        assert_eq!(body["region"]["region"]["valid_count"], 1);

        let (status, body) = get(&server, "/api/regions/pune-east").await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["total_count"], 1);
        assert_eq!(body["data"]["registered_vehicles"], 1);
        assert_eq!(body["data"]["unmatched_count"], 0);

        let (status, body) = get(&server, "/api/regions/pune-east/vehicles").await;
        assert_eq!(status, 200);
        assert_eq!(body["response"][0]["reg_no"], "MH12AB1234");

        let form = photo_form("image/png", b"png".to_vec()).text("regionName", "nowhere");
        let (status, _) = post_form(&server, form).await;
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn test_plate_check() {
        let server = serve(&[], FakeRto::valid(&["MH12AB1234"])).await;

        let (status, body) = post_json(&server, "/api/image", json!({})).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "RC number is required");

        let (status, body) =
            post_json(&server, "/api/image", json!({"rc_number": "MH12AB1234"})).await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "PUC details validated and saved successfully");
        assert_eq!(body["data"]["is_valid"], true);

        let (_, body) = post_json(&server, "/api/image", json!({"rc_number": "MH12AB1234"})).await;
        assert_eq!(body["message"], "PUC details fetched from database");

        let (status, body) =
            post_json(&server, "/api/image", json!({"rc_number": "ZZ00ZZ0000"})).await;
        assert_eq!(status, 400);
        assert_eq!(
            body["error"],
            "Validation failed for RC Number ZZ00ZZ0000: No data found or invalid response."
        );

        assert_eq!(server.rto.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_regions() {
        let server = serve(&[], FakeRto::default()).await;

        let (status, body) = post_json(&server, "/api/regions", json!({"regionName": "x"})).await;
        assert_eq!(status, 400);
        assert_eq!(
            body["error"],
            "All fields (regionName, city, state) are required"
        );

        let region = json!({"regionName": "pune-east", "city": "Pune", "state": "MH"});
        let (status, body) = post_json(&server, "/api/regions", region.clone()).await;
        assert_eq!(status, 201);
        assert_eq!(body["data"]["total_count"], 0);

        let (status, body) = post_json(&server, "/api/regions", region).await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "Region fetched from database");

        let (status, body) = get(&server, "/api/regions").await;
        assert_eq!(status, 200);
        assert_eq!(body["regions"].as_array().unwrap().len(), 1);
        assert_eq!(body["problem_regions"][0]["invalid_percentage"], 0.0);

        let (status, body) = get(&server, "/api/regions/nowhere").await;
        assert_eq!(status, 404);
        assert_eq!(body["error"], "Region nowhere not found");
    }

    #[tokio::test]
    async fn test_vehicle_classes() {
        let server = serve(&[], FakeRto::valid(&["MH12AB1234", "MH12AB9999"])).await;

        let (status, body) = get(&server, "/api/vehicle-classes").await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({"success": true, "data": []}));

        for plate in ["MH12AB1234", "MH12AB9999", "MH12AB1234"] {
            post_json(&server, "/api/image", json!({ "rc_number": plate })).await;
        }

        let (status, body) = get(&server, "/api/vehicle-classes").await;
        assert_eq!(status, 200);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], json!([{"name": "Motor Car(LMV)", "count": 2}]));
    }
}
