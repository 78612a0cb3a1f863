use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use facerec_core::{Embedding, Matcher};
use facerec_store::StoreSession;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct RecognizeResponse {
    pub status: String,
    pub name: String,
    pub confidence: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub status: String,
    pub message: String,
}

/// Fields collected from a multipart upload. Unknown fields are skipped.
#[derive(Default)]
struct FaceUpload {
    name: Option<String>,
    file: Option<Vec<u8>>,
}

impl FaceUpload {
    async fn read(multipart: Result<Multipart, MultipartRejection>) -> ApiResult<Self> {
        let mut multipart = multipart?;
        let mut upload = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let field_name = field.name().map(str::to_owned);
            match field_name.as_deref() {
                Some("file") => upload.file = Some(field.bytes().await?.to_vec()),
                Some("name") => upload.name = Some(field.text().await?),
                other => tracing::debug!(field = ?other, "ignoring form field"),
            }
        }
        Ok(upload)
    }

    fn take_file(&mut self) -> ApiResult<Vec<u8>> {
        self.file.take().ok_or(ApiError::MissingField("file"))
    }

    fn take_name(&mut self) -> ApiResult<String> {
        self.name
            .take()
            .filter(|name| !name.is_empty())
            .ok_or(ApiError::MissingField("name"))
    }
}

async fn embed(state: &AppState, image: Vec<u8>) -> ApiResult<Embedding> {
    state
        .engine
        .extract(image)
        .await?
        .ok_or(ApiError::NoFaceDetected)
}

/// Close a per-request session. The work is already committed or failed on
/// its own, so a close error is only logged.
async fn release(session: StoreSession) {
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "closing store session failed");
    }
}

/// `POST /recognize` — multipart `file`.
///
/// Compares the uploaded face against every registered face and reports the
/// closest name, or "Unknown" when nothing is within the threshold.
pub async fn recognize(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<RecognizeResponse>> {
    let image = FaceUpload::read(multipart).await?.take_file()?;
    let probe = embed(&state, image).await?;

    let session = state.store.session().await?;
    let gallery = session.load_all().await;
    release(session).await;
    let gallery = gallery?;

    let result = state.matcher.compare(&probe, &gallery)?;
    tracing::info!(
        name = result.label(),
        distance = ?result.distance,
        gallery = gallery.len(),
        "recognize"
    );

    Ok(Json(RecognizeResponse {
        status: "success".into(),
        name: result.label().to_string(),
        confidence: result.confidence(),
    }))
}

/// `POST /register` — multipart `name` and `file`.
pub async fn register(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<RegisterResponse>> {
    let mut upload = FaceUpload::read(multipart).await?;
    let name = upload.take_name()?;
    let image = upload.take_file()?;
    let embedding = embed(&state, image).await?;

    let session = state.store.session().await?;
    let record = session.insert(&name, &embedding).await;
    release(session).await;
    let record = record?;

    tracing::info!(
        name = %record.name,
        record_id = record.id,
        dim = record.embedding.dim(),
        "face registered"
    );

    Ok(Json(RegisterResponse {
        status: "success".into(),
        message: format!("Face registered for {name}"),
    }))
}
