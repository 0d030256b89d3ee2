use std::{io, path::Path, sync::Arc};

use axum::{
    extract::{
        multipart::Field, DefaultBodyLimit, Form, Multipart, Path as AxumPath, Query, RawQuery,
        Request, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use maud::Markup;
use serde::Deserialize;
use tokio::{fs, io::AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    archive::{parse_selection, ArchiveBuilder, ArchiveError},
    breadcrumb,
    classify::Classifier,
    config::Settings,
    error::{AppError, JsonError},
    listing::list_dir,
    paths::{decode, relative_path, PathResolver, MOUNT},
    render::{self, ListingPage},
    sorting::sort_by_query,
    trash::{BatchReport, Remover},
    unique,
};

// --- State ---
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub settings: Settings,
    pub resolver: PathResolver,
    pub classifier: Classifier,
    pub archiver: ArchiveBuilder,
    pub remover: Remover,
}

impl AppState {
    pub fn new(settings: Settings, classifier: Classifier) -> Self {
        Self {
            resolver: PathResolver::new(settings.root_dir.clone()),
            archiver: ArchiveBuilder::new(
                settings.archive_dir.clone(),
                settings.zip_program.clone(),
            ),
            remover: Remover::new(settings.delete_policy, settings.trash_dir.clone()),
            classifier,
            settings,
        }
    }
}

// --- Request Payloads ---
#[derive(Deserialize, Debug)]
struct ListQuery {
    s: Option<String>,
    o: Option<String>,
}

#[derive(Deserialize, Debug)]
struct NameForm {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize, Debug)]
struct MoveForm {
    #[serde(default)]
    frompath: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize, Debug)]
struct ArchiveForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    pathlist: String,
}

pub fn router(state: SharedState) -> Router {
    let admin = Router::new()
        .route("/delete", post(delete_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/", get(|| async { found(&format!("{MOUNT}/")) }))
        .route("/home", get(home_root_handler))
        .route("/home/", get(home_root_handler))
        .route("/home/*path", get(home_handler))
        .route("/upload", post(upload_handler))
        .route("/new", post(new_folder_handler))
        .route("/move", post(move_handler))
        .route("/archive", post(archive_handler))
        .merge(admin)
        .nest_service("/static", ServeDir::new(&state.settings.static_dir))
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(state.settings.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Handlers ---

async fn home_root_handler(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, AppError> {
    serve_path(&state, "", query, raw_query.unwrap_or_default()).await
}

async fn home_handler(
    State(state): State<SharedState>,
    AxumPath(path): AxumPath<String>,
    Query(query): Query<ListQuery>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, AppError> {
    serve_path(&state, &path, query, raw_query.unwrap_or_default()).await
}

/// Lists a directory or downloads a file. `path` is already percent-decoded.
async fn serve_path(
    state: &AppState,
    path: &str,
    query: ListQuery,
    raw_query: String,
) -> Result<Response, AppError> {
    let relative = relative_path(path);
    let local = state.resolver.root().join(&relative);
    let canonical = state.resolver.canonical(&local)?;

    if !canonical.is_dir() {
        let name = file_name_of(&canonical);
        return attachment_response(&canonical, &name).await;
    }

    let nav_prefix = state
        .resolver
        .url_for(&local)
        .unwrap_or_else(|| format!("{MOUNT}/"));
    let mut rows = list_dir(&canonical, &nav_prefix, &raw_query, &state.classifier).await;
    let sort = sort_by_query(&mut rows, query.s.as_deref(), query.o.as_deref());

    let relative_display = relative.to_string_lossy().replace('\\', "/");
    let crumbs = breadcrumb::build(&format!("{MOUNT}/{relative_display}"), &raw_query);
    let title = format!("/{relative_display}");

    Ok(render::listing_page(&ListingPage {
        title: &title,
        rows: &rows,
        crumbs: &crumbs,
        sort,
    })
    .into_response())
}

async fn upload_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let back = referer_path(&headers)?;
    // Writes land inside this directory, so symlinks are resolved before the
    // containment check.
    let dir = state.resolver.canonical(&state.resolver.resolve_encoded(&back))?;
    if !dir.is_dir() {
        return Err(AppError::BadRequest("Upload target is not a folder.".into()));
    }

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid upload: {e}")))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let Some(name) = field.file_name().and_then(upload_name) else {
            warn!("Skipping upload without a usable file name");
            continue;
        };
        let dest = match unique::allocate(&dir.join(&name)) {
            Ok(dest) => dest,
            Err(e) => {
                warn!("Skipping upload {}: {}", name, e);
                continue;
            }
        };
        let file = match open_upload(&dest).await {
            Ok(file) => file,
            Err(e) => {
                warn!("Skipping upload {}: {}", dest.display(), e);
                continue;
            }
        };
        match save_field(field, file).await {
            Ok(bytes) => info!("Saved upload {} ({} bytes)", dest.display(), bytes),
            Err(e) => {
                error!("Failed to save upload {}: {}", name, e);
                if let Err(e) = fs::remove_file(&dest).await {
                    warn!("Failed to remove partial upload {}: {}", dest.display(), e);
                }
            }
        }
    }

    Ok(found(&back))
}

async fn new_folder_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Form(form): Form<NameForm>,
) -> Result<Response, AppError> {
    let back = referer_path(&headers)?;
    let name = form.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("The name cannot be empty!".into()));
    }

    let url = format!("{}/{}", decode(&back).trim_end_matches('/'), name);
    let target = state.resolver.confine(&state.resolver.resolve(&url))?;
    fs::create_dir_all(&target).await?;
    info!("Created folder {}", target.display());

    Ok(found(&back))
}

async fn move_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Form(form): Form<MoveForm>,
) -> Result<Response, AppError> {
    let back = referer_path(&headers)?;
    let (from, to) = (form.frompath.trim(), form.name.trim());
    if from.is_empty() || to.is_empty() {
        return Err(AppError::BadRequest("File path cannot be empty!".into()));
    }

    let resolver = &state.resolver;
    let src = resolver.confine(&resolver.resolve_encoded(from))?;
    let dst = resolver.confine(&resolver.resolve_encoded(to))?;
    if src == resolver.root() || dst == resolver.root() {
        return Err(AppError::BadRequest("The root folder cannot be moved.".into()));
    }
    if fs::symlink_metadata(&src).await.is_err() {
        return Err(AppError::NotFound(format!("'{from}' does not exist.")));
    }
    if fs::symlink_metadata(&dst).await.is_ok() {
        return Err(AppError::BadRequest(format!("'{to}' already exists.")));
    }
    if dst.starts_with(&src) {
        return Err(AppError::BadRequest("A folder cannot be moved into itself.".into()));
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }
    info!("Moving {} to {}", src.display(), dst.display());
    fs::rename(&src, &dst).await?;

    Ok(found(&back))
}

async fn delete_handler(
    State(state): State<SharedState>,
    body: String,
) -> Result<Json<serde_json::Value>, JsonError> {
    let targets: Vec<String> = serde_json::from_str(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid delete list: {e}")))?;

    let mut report = BatchReport::default();
    let mut resolved = Vec::with_capacity(targets.len());
    for raw in &targets {
        let local = state.resolver.resolve_encoded(raw);
        match state.resolver.confine(&local) {
            Ok(path) if path == state.resolver.root() => {
                report.fail(path, "refusing to delete the root folder")
            }
            Ok(path) => resolved.push(path),
            Err(e) => report.fail(local, e),
        }
    }
    state.remover.remove_batch(resolved, &mut report).await;
    info!(
        "Delete batch ({:?}): {} removed, {} failed",
        state.remover.policy(),
        report.removed.len(),
        report.failed.len()
    );

    Ok(Json(serde_json::json!({
        "err": 0,
        "removed": report.removed.len(),
        "failed": report.failed.len(),
    })))
}

async fn archive_handler(
    State(state): State<SharedState>,
    Form(form): Form<ArchiveForm>,
) -> Result<Response, AppError> {
    if form.name.trim().is_empty() {
        return Err(ArchiveError::EmptyLabel.into());
    }
    let selected = parse_selection(&form.pathlist)?;
    info!("Archive list: {:?}", selected);

    let (job, produced) = state
        .archiver
        .archive(&state.resolver, &selected, &form.name)
        .await?;
    attachment_response(&produced, &job.output_name).await
}

async fn not_found_handler() -> (StatusCode, Markup) {
    (StatusCode::NOT_FOUND, render::not_found_page())
}

async fn require_admin(
    State(state): State<SharedState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, JsonError> {
    if let Some(expected) = &state.settings.admin_token {
        let supplied = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if supplied != Some(expected.as_str()) {
            warn!("Rejected unauthenticated delete request");
            return Err(JsonError(AppError::Unauthorized));
        }
    }
    Ok(next.run(request).await)
}

// --- Utility Functions ---

/// 302 to `location`, matching how browsers return to the page they came from.
fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => AppError::BadRequest("Invalid redirect target.".into()).into_response(),
    }
}

/// Path component of the Referer header, still percent-encoded.
fn referer_path(headers: &HeaderMap) -> Result<String, AppError> {
    let raw = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Referer header.".into()))?;
    let uri: Uri = raw
        .parse()
        .map_err(|e| AppError::BadRequest(format!("Invalid Referer URL: {e}")))?;
    Ok(uri.path().to_string())
}

/// Final component of a client-supplied file name.
fn upload_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(&['/', '\\'][..]).next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

/// Creates `dest` for writing. Fails if anything already sits at that name,
/// so a concurrent upload that claimed it first is left alone.
async fn open_upload(dest: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .await
}

async fn save_field(mut field: Field<'_>, mut file: fs::File) -> io::Result<u64> {
    let mut total = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
    {
        total += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(total)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string())
}

/// `attachment` with an ASCII fallback name plus the RFC 5987 UTF-8 form.
fn content_disposition(name: &str) -> HeaderValue {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Streams `path` back as a download named `download_name`.
async fn attachment_response(path: &Path, download_name: &str) -> Result<Response, AppError> {
    let metadata = fs::metadata(path).await.map_err(|e| {
        error!("Failed to get metadata for file {}: {}", path.display(), e);
        AppError::from(e)
    })?;
    let file = fs::File::open(path).await.map_err(|e| {
        error!("Failed to open file for download {}: {}", path.display(), e);
        AppError::from(e)
    })?;

    let mime_type = mime_guess::from_path(download_name)
        .first_or_octet_stream()
        .to_string();
    let body = axum::body::Body::from_stream(ReaderStream::new(file));

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(download_name));

    Ok((StatusCode::OK, headers, body).into_response())
}
