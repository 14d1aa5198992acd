//! HTTP server for the cardbox web app
//!
//! `cardbox serve` → starts server, JSON API under /api, embedded UI at /

use crate::auth::{self, AuthError, SESSION_COOKIE};
use crate::config::Config;
use crate::db::{Database, DbError, FlashcardChanges, FlashcardDraft, ListParams, SORTABLE_COLUMNS};
use crate::generation::{self, GenerationError};
use crate::llm::LlmClient;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Read;
use tiny_http::{Header, Method, Request, Response, Server};

// Embedded single-page UI (vanilla JS, no build step)
const APP_HTML: &str = include_str!("app.html");

/// Largest request body accepted; the biggest legitimate payload (a full
/// generation batch) is well under this
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Everything a request handler needs, passed explicitly instead of living
/// in globals
pub struct ServerContext {
    pub db: Database,
    pub config: Config,
}

/// One field-level validation failure, reported in 400 bodies
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// Computed reply, turned into a tiny_http response at the edge
struct HttpReply {
    status: u16,
    body: Value,
    set_cookie: Option<String>,
}

impl HttpReply {
    fn new(status: u16, body: Value) -> Self {
        Self { status, body, set_cookie: None }
    }

    fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    fn created(body: Value) -> Self {
        Self::new(201, body)
    }

    fn validation_failed(details: Vec<FieldError>) -> Self {
        Self::new(400, json!({ "error": "Validation failed", "details": details }))
    }

    fn bad_request(message: &str) -> Self {
        Self::new(400, json!({ "error": message }))
    }

    fn unauthorized() -> Self {
        Self::new(401, json!({ "error": "Unauthorized" }))
    }

    fn not_found(message: &str) -> Self {
        Self::new(404, json!({ "error": message }))
    }

    /// Internal failures are logged server-side; the message never reaches
    /// the client.
    fn internal(context: &str, err: &dyn std::fmt::Display) -> Self {
        eprintln!("{} {}: {}", "error".red().bold(), context, err);
        Self::new(500, json!({ "error": "Internal server error" }))
    }

    fn with_cookie(mut self, cookie: String) -> Self {
        self.set_cookie = Some(cookie);
        self
    }
}

fn session_cookie(token: &str, ttl_days: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        ttl_days * 24 * 60 * 60
    )
}

fn clear_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

/// Start the cardbox server on the given port (blocks forever)
pub fn start(ctx: ServerContext, port: u16) -> std::io::Result<()> {
    let server = bind(port)?;
    let url = format!("http://localhost:{}", port);

    eprintln!("\n{}", "🗃  cardbox".green().bold());
    eprintln!("   Web app: {}", url);
    if ctx.config.llm.api_key.is_empty() {
        eprintln!(
            "   {} no API key configured; set CARDBOX_API_KEY to enable generation",
            "warning:".yellow()
        );
    }
    eprintln!("   Press Ctrl+C to stop\n");

    run(server, ctx);
    Ok(())
}

/// Bind the listening socket. Split from [`run`] so tests can bind port 0
/// and discover the assigned port.
pub fn bind(port: u16) -> std::io::Result<Server> {
    let addr = format!("127.0.0.1:{}", port);
    Server::http(&addr).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

/// Serve requests forever
pub fn run(server: Server, ctx: ServerContext) {
    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, &ctx) {
            eprintln!("{} {}", "error".red().bold(), e);
        }
    }
}

fn handle_request(mut request: Request, ctx: &ServerContext) -> std::io::Result<()> {
    let url = request.url().to_string();
    let (path, query) = match url.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (url, String::new()),
    };
    let method = request.method().clone();

    // Serve the embedded UI for page routes
    if method == Method::Get && matches!(path.as_str(), "/" | "/flashcards" | "/login" | "/register") {
        let response = Response::from_string(APP_HTML)
            .with_header(Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]).unwrap());
        return request.respond(response);
    }

    let cookie_header = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Cookie"))
        .map(|h| h.value.as_str().to_string());

    let body = if method == Method::Post || method == Method::Put {
        let mut buf = String::new();
        // Cap the read so an oversized body is rejected instead of buffered
        let read = request
            .as_reader()
            .take(MAX_BODY_BYTES as u64 + 1)
            .read_to_string(&mut buf);
        if let Err(e) = read {
            let reply = HttpReply::bad_request(&format!("Failed to read body: {}", e));
            return respond(request, reply);
        }
        if buf.len() > MAX_BODY_BYTES {
            let reply = HttpReply::new(413, json!({ "error": "Request body too large" }));
            return respond(request, reply);
        }
        buf
    } else {
        String::new()
    };

    let reply = route(ctx, &method, &path, &query, &body, cookie_header.as_deref());
    respond(request, reply)
}

fn respond(request: Request, reply: HttpReply) -> std::io::Result<()> {
    let json = reply.body.to_string();
    let mut response = Response::from_string(json)
        .with_status_code(reply.status)
        .with_header(Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap());
    if let Some(cookie) = reply.set_cookie {
        response = response
            .with_header(Header::from_bytes(&b"Set-Cookie"[..], cookie.as_bytes()).unwrap());
    }
    request.respond(response)
}

fn route(
    ctx: &ServerContext,
    method: &Method,
    path: &str,
    query: &str,
    body: &str,
    cookie_header: Option<&str>,
) -> HttpReply {
    let token = cookie_header.and_then(auth::session_token_from_cookies);

    match (method, path) {
        // --- identity lifecycle ---
        (Method::Post, "/api/auth/register") => handle_register(ctx, body),
        (Method::Post, "/api/auth/login") => handle_login(ctx, body),
        (Method::Post, "/api/auth/logout") => handle_logout(ctx, token.as_deref()),
        (Method::Get, "/api/auth/me") => handle_me(ctx, token.as_deref()),
        (Method::Post, "/api/auth/deactivate") => handle_deactivate(ctx, token.as_deref()),
        (Method::Post, "/api/auth/change-password") => {
            handle_change_password(ctx, token.as_deref(), body)
        }

        // --- generation workflow ---
        (Method::Post, "/api/generations") => handle_generate(ctx, token.as_deref(), body),
        (Method::Get, "/api/generations") => handle_list_generations(ctx, token.as_deref(), query),
        (Method::Get, "/api/generation-error-logs") => {
            handle_list_error_logs(ctx, token.as_deref(), query)
        }

        // --- flashcard CRUD ---
        (Method::Get, "/api/flashcards") => handle_list_flashcards(ctx, token.as_deref(), query),
        (Method::Post, "/api/flashcards") => handle_create_flashcards(ctx, token.as_deref(), body),
        (method, path) if path.starts_with("/api/flashcards/") => {
            let id_part = path.strip_prefix("/api/flashcards/").unwrap_or_default();
            let card_id: i32 = match id_part.parse() {
                Ok(id) if id > 0 => id,
                _ => return HttpReply::bad_request("Invalid flashcard ID"),
            };
            match method {
                Method::Get => handle_get_flashcard(ctx, token.as_deref(), card_id),
                Method::Put => handle_update_flashcard(ctx, token.as_deref(), card_id, body),
                Method::Delete => handle_delete_flashcard(ctx, token.as_deref(), card_id),
                _ => HttpReply::not_found("Not found"),
            }
        }

        _ => HttpReply::not_found("Not found"),
    }
}

// ============================================================================
// Auth Handlers
// ============================================================================

#[derive(Deserialize)]
struct CredentialsRequest {
    email: String,
    password: String,
}

fn handle_register(ctx: &ServerContext, body: &str) -> HttpReply {
    let req: CredentialsRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return HttpReply::bad_request(&format!("Invalid JSON: {}", e)),
    };

    match auth::register(&ctx.db, &req.email, &req.password) {
        Ok(user) => HttpReply::ok(json!({
            "user": { "id": user.id, "email": user.email },
            "message": "Registration successful! Please sign in to your account."
        })),
        Err(AuthError::Validation(msg)) => HttpReply::bad_request(&msg),
        Err(e) => HttpReply::internal("registering user", &e),
    }
}

fn handle_login(ctx: &ServerContext, body: &str) -> HttpReply {
    let req: CredentialsRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return HttpReply::bad_request(&format!("Invalid JSON: {}", e)),
    };

    let ttl = ctx.config.auth.session_ttl_days;
    match auth::login(&ctx.db, &req.email, &req.password, ttl) {
        Ok((user, session)) => HttpReply::ok(json!({
            "user": { "id": user.id, "email": user.email }
        }))
        .with_cookie(session_cookie(&session.token, ttl)),
        Err(AuthError::InvalidCredentials) => {
            HttpReply::new(401, json!({ "error": "Invalid email or password" }))
        }
        Err(AuthError::Validation(msg)) => HttpReply::bad_request(&msg),
        Err(e) => HttpReply::internal("logging in", &e),
    }
}

fn handle_logout(ctx: &ServerContext, token: Option<&str>) -> HttpReply {
    if let Some(token) = token {
        if let Err(e) = auth::logout(&ctx.db, token) {
            return HttpReply::internal("logging out", &e);
        }
    }
    HttpReply::ok(Value::Null).with_cookie(clear_session_cookie())
}

fn handle_me(ctx: &ServerContext, token: Option<&str>) -> HttpReply {
    match auth::current_user(&ctx.db, token) {
        Ok(user) => HttpReply::ok(json!({
            "user": { "id": user.id, "email": user.email }
        })),
        Err(AuthError::Unauthorized) => HttpReply::unauthorized(),
        Err(e) => HttpReply::internal("resolving session", &e),
    }
}

fn handle_deactivate(ctx: &ServerContext, token: Option<&str>) -> HttpReply {
    let user = match auth::current_user(&ctx.db, token) {
        Ok(user) => user,
        Err(AuthError::Unauthorized) => return HttpReply::unauthorized(),
        Err(e) => return HttpReply::internal("resolving session", &e),
    };

    match auth::deactivate(&ctx.db, &user.id) {
        Ok(()) => HttpReply::ok(Value::Null).with_cookie(clear_session_cookie()),
        Err(e) => HttpReply::internal("deactivating account", &e),
    }
}

#[derive(Deserialize)]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

fn handle_change_password(ctx: &ServerContext, token: Option<&str>, body: &str) -> HttpReply {
    let user = match auth::current_user(&ctx.db, token) {
        Ok(user) => user,
        Err(AuthError::Unauthorized) => return HttpReply::unauthorized(),
        Err(e) => return HttpReply::internal("resolving session", &e),
    };

    let req: ChangePasswordRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return HttpReply::bad_request(&format!("Invalid JSON: {}", e)),
    };

    match auth::change_password(&ctx.db, &user, &req.current_password, &req.new_password) {
        Ok(()) => HttpReply::ok(json!({ "message": "Password updated" })),
        Err(AuthError::InvalidCredentials) => {
            HttpReply::new(401, json!({ "error": "Current password is incorrect" }))
        }
        Err(AuthError::Validation(msg)) => HttpReply::bad_request(&msg),
        Err(e) => HttpReply::internal("changing password", &e),
    }
}

// ============================================================================
// Generation Handlers
// ============================================================================

/// Source text bounds enforced at the boundary
pub const SOURCE_TEXT_MIN: usize = 1000;
pub const SOURCE_TEXT_MAX: usize = 10_000;

#[derive(Deserialize)]
struct GenerateRequest {
    source_text: String,
}

/// Validate the generation request body
pub fn validate_source_text(text: &str) -> Vec<FieldError> {
    let len = text.chars().count();
    let mut details = Vec::new();
    if len < SOURCE_TEXT_MIN {
        details.push(FieldError::new(
            "source_text",
            format!("Text must be at least {} characters long", SOURCE_TEXT_MIN),
        ));
    } else if len > SOURCE_TEXT_MAX {
        details.push(FieldError::new(
            "source_text",
            format!("Text cannot exceed {} characters", SOURCE_TEXT_MAX),
        ));
    }
    details
}

fn handle_generate(ctx: &ServerContext, token: Option<&str>, body: &str) -> HttpReply {
    let user = match auth::current_user(&ctx.db, token) {
        Ok(user) => user,
        Err(AuthError::Unauthorized) => return HttpReply::unauthorized(),
        Err(e) => return HttpReply::internal("resolving session", &e),
    };

    let req: GenerateRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return HttpReply::bad_request(&format!("Invalid JSON: {}", e)),
    };

    let details = validate_source_text(&req.source_text);
    if !details.is_empty() {
        return HttpReply::validation_failed(details);
    }

    let mut client = match LlmClient::new(&ctx.config.llm) {
        Ok(client) => client,
        Err(e) => return HttpReply::internal("building LLM client", &e),
    };

    match generation::generate_flashcards(&ctx.db, &mut client, &user.id, &req.source_text) {
        Ok(result) => match serde_json::to_value(&result) {
            Ok(value) => HttpReply::created(value),
            Err(e) => HttpReply::internal("serializing generation result", &e),
        },
        Err(e @ GenerationError::Llm(_)) => HttpReply::internal("generating flashcards", &e),
        Err(e @ GenerationError::Db(_)) => HttpReply::internal("recording generation", &e),
    }
}

#[derive(Deserialize, Default)]
struct PageQuery {
    page: Option<i64>,
    limit: Option<i64>,
}

/// Upper bound accepted for `page`; anything above is nonsense input, and an
/// unbounded value would overflow the offset computation downstream
pub const PAGE_MAX: i64 = 1_000_000;

/// Validate bare page/limit query params, applying defaults
pub fn validate_page_limit(page: Option<i64>, limit: Option<i64>) -> Result<(i64, i64), Vec<FieldError>> {
    let mut details = Vec::new();
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(20);
    if !(1..=PAGE_MAX).contains(&page) {
        details.push(FieldError::new(
            "page",
            format!("Page must be between 1 and {}", PAGE_MAX),
        ));
    }
    if !(1..=100).contains(&limit) {
        details.push(FieldError::new("limit", "Limit must be between 1 and 100"));
    }
    if details.is_empty() {
        Ok((page, limit))
    } else {
        Err(details)
    }
}

fn parse_page_query(query: &str) -> Result<(i64, i64), HttpReply> {
    let parsed: PageQuery = serde_urlencoded::from_str(query)
        .map_err(|e| HttpReply::bad_request(&format!("Invalid query parameters: {}", e)))?;
    validate_page_limit(parsed.page, parsed.limit).map_err(HttpReply::validation_failed)
}

fn handle_list_generations(ctx: &ServerContext, token: Option<&str>, query: &str) -> HttpReply {
    let user = match auth::current_user(&ctx.db, token) {
        Ok(user) => user,
        Err(AuthError::Unauthorized) => return HttpReply::unauthorized(),
        Err(e) => return HttpReply::internal("resolving session", &e),
    };

    let (page, limit) = match parse_page_query(query) {
        Ok(pair) => pair,
        Err(reply) => return reply,
    };

    match ctx.db.list_generations(&user.id, page, limit) {
        Ok((rows, total)) => HttpReply::ok(json!({
            "data": rows,
            "pagination": { "page": page, "limit": limit, "total": total }
        })),
        Err(e) => HttpReply::internal("listing generations", &e),
    }
}

fn handle_list_error_logs(ctx: &ServerContext, token: Option<&str>, query: &str) -> HttpReply {
    let user = match auth::current_user(&ctx.db, token) {
        Ok(user) => user,
        Err(AuthError::Unauthorized) => return HttpReply::unauthorized(),
        Err(e) => return HttpReply::internal("resolving session", &e),
    };

    let (page, limit) = match parse_page_query(query) {
        Ok(pair) => pair,
        Err(reply) => return reply,
    };

    match ctx.db.list_generation_errors(&user.id, page, limit) {
        Ok((rows, total)) => HttpReply::ok(json!({
            "data": rows,
            "pagination": { "page": page, "limit": limit, "total": total }
        })),
        Err(e) => HttpReply::internal("listing generation error logs", &e),
    }
}

// ============================================================================
// Flashcard Handlers
// ============================================================================

/// Front/back length limits, enforced client-side and here
pub const FRONT_MAX: usize = 200;
pub const BACK_MAX: usize = 500;

const VALID_SOURCES: &[&str] = &["manual", "ai-full", "ai-edited"];
const VALID_UPDATE_SOURCES: &[&str] = &["manual", "ai-edited"];

#[derive(Deserialize)]
struct ListFlashcardsQuery {
    page: Option<i64>,
    limit: Option<i64>,
    search: Option<String>,
    #[serde(rename = "sortBy")]
    sort_by: Option<String>,
    order: Option<String>,
}

/// Validate the flashcard list query into [`ListParams`]
pub fn validate_list_query(
    page: Option<i64>,
    limit: Option<i64>,
    search: Option<String>,
    sort_by: Option<String>,
    order: Option<String>,
) -> Result<ListParams, Vec<FieldError>> {
    let mut details = Vec::new();

    let (page, limit) = match validate_page_limit(page, limit) {
        Ok(pair) => pair,
        Err(mut errs) => {
            details.append(&mut errs);
            (1, 20)
        }
    };

    let sort_by = sort_by.unwrap_or_else(|| "created_at".to_string());
    if !SORTABLE_COLUMNS.contains(&sort_by.as_str()) {
        details.push(FieldError::new("sortBy", "Invalid sort column"));
    }

    let descending = match order.as_deref() {
        None | Some("desc") => true,
        Some("asc") => false,
        Some(_) => {
            details.push(FieldError::new("order", "Order must be 'asc' or 'desc'"));
            true
        }
    };

    if !details.is_empty() {
        return Err(details);
    }

    Ok(ListParams {
        page,
        limit,
        search: search.filter(|s| !s.is_empty()),
        sort_by,
        descending,
    })
}

fn handle_list_flashcards(ctx: &ServerContext, token: Option<&str>, query: &str) -> HttpReply {
    let user = match auth::current_user(&ctx.db, token) {
        Ok(user) => user,
        Err(AuthError::Unauthorized) => return HttpReply::unauthorized(),
        Err(e) => return HttpReply::internal("resolving session", &e),
    };

    let parsed: ListFlashcardsQuery = match serde_urlencoded::from_str(query) {
        Ok(p) => p,
        Err(e) => return HttpReply::bad_request(&format!("Invalid query parameters: {}", e)),
    };

    let params = match validate_list_query(
        parsed.page,
        parsed.limit,
        parsed.search,
        parsed.sort_by,
        parsed.order,
    ) {
        Ok(params) => params,
        Err(details) => return HttpReply::validation_failed(details),
    };

    match ctx.db.list_flashcards(&user.id, &params) {
        Ok((rows, total)) => HttpReply::ok(json!({
            "data": rows,
            "pagination": { "page": params.page, "limit": params.limit, "total": total }
        })),
        Err(e) => HttpReply::internal("listing flashcards", &e),
    }
}

#[derive(Deserialize)]
struct FlashcardInput {
    front: String,
    back: String,
    source: String,
    generation_id: Option<i32>,
}

#[derive(Deserialize)]
struct CreateFlashcardsRequest {
    flashcards: Vec<FlashcardInput>,
}

/// Validate one flashcard in a create batch. `index` feeds the field path in
/// error details.
fn validate_card_input(index: usize, card: &FlashcardInput) -> Vec<FieldError> {
    let mut details = Vec::new();
    let field = |name: &str| format!("flashcards[{}].{}", index, name);

    if card.front.trim().is_empty() {
        details.push(FieldError::new(field("front"), "Front content is required"));
    } else if card.front.chars().count() > FRONT_MAX {
        details.push(FieldError::new(
            field("front"),
            format!("Front content cannot exceed {} characters", FRONT_MAX),
        ));
    }

    if card.back.trim().is_empty() {
        details.push(FieldError::new(field("back"), "Back content is required"));
    } else if card.back.chars().count() > BACK_MAX {
        details.push(FieldError::new(
            field("back"),
            format!("Back content cannot exceed {} characters", BACK_MAX),
        ));
    }

    if !VALID_SOURCES.contains(&card.source.as_str()) {
        details.push(FieldError::new(field("source"), "Invalid source value"));
    }

    match (card.source.as_str(), card.generation_id) {
        // generation_id is only meaningful for AI-derived cards
        ("manual", Some(_)) => {
            details.push(FieldError::new(
                field("generation_id"),
                "Manual flashcards cannot reference a generation",
            ));
        }
        (_, Some(id)) if id < 1 => {
            details.push(FieldError::new(field("generation_id"), "Invalid generation id"));
        }
        _ => {}
    }

    details
}

fn handle_create_flashcards(ctx: &ServerContext, token: Option<&str>, body: &str) -> HttpReply {
    let user = match auth::current_user(&ctx.db, token) {
        Ok(user) => user,
        Err(AuthError::Unauthorized) => return HttpReply::unauthorized(),
        Err(e) => return HttpReply::internal("resolving session", &e),
    };

    let req: CreateFlashcardsRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return HttpReply::bad_request(&format!("Invalid JSON: {}", e)),
    };

    if req.flashcards.is_empty() {
        return HttpReply::validation_failed(vec![FieldError::new(
            "flashcards",
            "At least one flashcard is required",
        )]);
    }

    let details: Vec<FieldError> = req
        .flashcards
        .iter()
        .enumerate()
        .flat_map(|(i, card)| validate_card_input(i, card))
        .collect();
    if !details.is_empty() {
        return HttpReply::validation_failed(details);
    }

    let drafts: Vec<FlashcardDraft> = req
        .flashcards
        .into_iter()
        .map(|card| FlashcardDraft {
            front: card.front,
            back: card.back,
            source: card.source,
            generation_id: card.generation_id,
        })
        .collect();

    match ctx.db.create_flashcards(&user.id, &drafts) {
        Ok(rows) => HttpReply::created(json!({ "data": rows })),
        Err(e) => HttpReply::internal("creating flashcards", &e),
    }
}

#[derive(Deserialize)]
struct UpdateFlashcardRequest {
    front: Option<String>,
    back: Option<String>,
    source: Option<String>,
}

/// Validate a partial update body
fn validate_update(req: &UpdateFlashcardRequest) -> Vec<FieldError> {
    let mut details = Vec::new();

    if req.front.is_none() && req.back.is_none() && req.source.is_none() {
        details.push(FieldError::new("body", "At least one field must be provided for update"));
        return details;
    }

    if let Some(ref front) = req.front {
        if front.trim().is_empty() {
            details.push(FieldError::new("front", "Front content is required"));
        } else if front.chars().count() > FRONT_MAX {
            details.push(FieldError::new(
                "front",
                format!("Front content cannot exceed {} characters", FRONT_MAX),
            ));
        }
    }
    if let Some(ref back) = req.back {
        if back.trim().is_empty() {
            details.push(FieldError::new("back", "Back content is required"));
        } else if back.chars().count() > BACK_MAX {
            details.push(FieldError::new(
                "back",
                format!("Back content cannot exceed {} characters", BACK_MAX),
            ));
        }
    }
    if let Some(ref source) = req.source {
        // An edited AI card becomes ai-edited; nothing can become ai-full again
        if !VALID_UPDATE_SOURCES.contains(&source.as_str()) {
            details.push(FieldError::new("source", "Invalid source value"));
        }
    }

    details
}

fn handle_get_flashcard(ctx: &ServerContext, token: Option<&str>, card_id: i32) -> HttpReply {
    let user = match auth::current_user(&ctx.db, token) {
        Ok(user) => user,
        Err(AuthError::Unauthorized) => return HttpReply::unauthorized(),
        Err(e) => return HttpReply::internal("resolving session", &e),
    };

    match ctx.db.get_flashcard(card_id, &user.id) {
        Ok(card) => match serde_json::to_value(&card) {
            Ok(value) => HttpReply::ok(value),
            Err(e) => HttpReply::internal("serializing flashcard", &e),
        },
        Err(DbError::NotFound) => HttpReply::not_found("Flashcard not found"),
        Err(e) => HttpReply::internal("fetching flashcard", &e),
    }
}

fn handle_update_flashcard(
    ctx: &ServerContext,
    token: Option<&str>,
    card_id: i32,
    body: &str,
) -> HttpReply {
    let user = match auth::current_user(&ctx.db, token) {
        Ok(user) => user,
        Err(AuthError::Unauthorized) => return HttpReply::unauthorized(),
        Err(e) => return HttpReply::internal("resolving session", &e),
    };

    let req: UpdateFlashcardRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return HttpReply::bad_request(&format!("Invalid JSON: {}", e)),
    };

    let details = validate_update(&req);
    if !details.is_empty() {
        return HttpReply::validation_failed(details);
    }

    let changes = FlashcardChanges { front: req.front, back: req.back, source: req.source };

    match ctx.db.update_flashcard(card_id, &user.id, &changes) {
        Ok(card) => HttpReply::ok(json!({ "data": card })),
        Err(DbError::NotFound) => HttpReply::not_found("Flashcard not found"),
        Err(e) => HttpReply::internal("updating flashcard", &e),
    }
}

fn handle_delete_flashcard(ctx: &ServerContext, token: Option<&str>, card_id: i32) -> HttpReply {
    let user = match auth::current_user(&ctx.db, token) {
        Ok(user) => user,
        Err(AuthError::Unauthorized) => return HttpReply::unauthorized(),
        Err(e) => return HttpReply::internal("resolving session", &e),
    };

    // Soft-delete of a missing or already-deleted row is a silent no-op
    match ctx.db.delete_flashcard(card_id, &user.id) {
        Ok(_) => HttpReply::ok(json!({ "message": "Flashcard deleted successfully" })),
        Err(e) => HttpReply::internal("deleting flashcard", &e),
    }
}
