mod quiz;
mod results;

use dotenv::dotenv;
use env_logger::Builder;
use lazy_static::lazy_static;
use log::LevelFilter;
use quiz::loader::QuizLoader;
use results::comparison::{ComparisonEngine, DetailMode};
use results::record::AnswerRecord;
use results::storage::{RecordStore, Storage};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

#[macro_use]
extern crate log;

lazy_static! {
    static ref STORAGE_DIR: String =
        std::env::var("STORAGE_DIR").unwrap_or_else(|_| "./storage".to_string());
    static ref QUIZ_DIR: String =
        std::env::var("QUIZ_DIR").unwrap_or_else(|_| "./quizzes".to_string());
    static ref PORT: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);
}

/// Largest submission body accepted, in bytes.
const MAX_SUBMISSION_BYTES: u64 = 64 * 1024;

#[derive(Deserialize, Serialize, Default)]
struct DetailQuery {
    #[serde(default)]
    expanded: bool,
}

#[derive(Serialize)]
struct SubmitResponse {
    id: u64,
}

#[derive(Serialize)]
struct ErrorMessage {
    code: u16,
    message: String,
}

/// Unknown quiz or submission. Rejected as a custom type so it is not
/// replaced by the 405 of a sibling route that matched the path.
#[derive(Debug)]
struct NotFound;

impl warp::reject::Reject for NotFound {}

#[derive(Debug)]
struct InternalError(String);

impl warp::reject::Reject for InternalError {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // read .env
    dotenv().ok();

    // init logger
    let log_level = std::env::var("RUST_LOG").unwrap_or_default();

    if log_level == "debug" {
        Builder::new()
            .filter(None, LevelFilter::Off)
            .filter(Some("pquiz"), LevelFilter::Debug)
            .init();
    } else if log_level == "info" {
        Builder::new()
            .filter(None, LevelFilter::Off)
            .filter(Some("pquiz"), LevelFilter::Info)
            .init();
    } else {
        env_logger::init();
    }

    // check dependencies
    if !Path::new(QUIZ_DIR.as_str()).is_dir() {
        warn!("quiz dir {} not found, no quizzes will be served", *QUIZ_DIR);
    }
    let storage = Arc::new(Storage::new(&STORAGE_DIR)?);
    info!("storage opened at {}", *STORAGE_DIR);

    let loader = QuizLoader::new(QUIZ_DIR.as_str());
    let routes = routes(loader, storage);

    info!("server running at port: {}", *PORT);
    warp::serve(routes).run(([0, 0, 0, 0], *PORT)).await;

    Ok(())
}

fn routes(
    loader: QuizLoader,
    storage: Arc<Storage>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let engine = Arc::new(ComparisonEngine::new(Arc::clone(&storage)));

    let with_loader = warp::any().map(move || loader.clone());
    let with_storage = warp::any().map(move || Arc::clone(&storage));
    let with_engine = warp::any().map(move || Arc::clone(&engine));

    let index_route = warp::path::end()
        .and(warp::get())
        .and(with_loader.clone())
        .and_then(handle_index);

    let quiz_route = warp::path!("quiz" / String)
        .and(warp::get())
        .and(with_loader.clone())
        .and_then(handle_quiz);

    let submit_route = warp::path!("quiz" / "submit" / String)
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_SUBMISSION_BYTES))
        .and(warp::body::json::<AnswerRecord>())
        .and(with_loader.clone())
        .and(with_storage)
        .and_then(handle_submit);

    let compare_all_route = warp::path!("results" / String / u64)
        .and(warp::get())
        .and(warp::query::<DetailQuery>())
        .and(with_loader.clone())
        .and(with_engine.clone())
        .and_then(handle_compare_all);

    let compare_two_route = warp::path!("results" / String / u64 / u64)
        .and(warp::get())
        .and(warp::query::<DetailQuery>())
        .and(with_loader)
        .and(with_engine)
        .and_then(handle_compare_two);

    index_route
        .or(quiz_route)
        .or(submit_route)
        .or(compare_all_route)
        .or(compare_two_route)
        .recover(handle_rejection)
}

async fn handle_index(loader: QuizLoader) -> Result<impl Reply, Rejection> {
    let quizzes = loader.list_quizzes().await.map_err(internal)?;
    info!("get index request return {} quizzes", quizzes.len());
    Ok(warp::reply::json(&quizzes))
}

async fn handle_quiz(slug: String, loader: QuizLoader) -> Result<impl Reply, Rejection> {
    let quiz = loader
        .find_quiz(&slug)
        .await
        .map_err(internal)?
        .ok_or_else(not_found)?;
    info!("get quiz request: {}", quiz);
    Ok(warp::reply::json(&quiz))
}

async fn handle_submit(
    slug: String,
    record: AnswerRecord,
    loader: QuizLoader,
    storage: Arc<Storage>,
) -> Result<impl Reply, Rejection> {
    let quiz = loader
        .find_quiz(&slug)
        .await
        .map_err(internal)?
        .ok_or_else(not_found)?;
    let unanswered = quiz
        .question_keys()
        .filter(|key| record.get(key).is_none())
        .count();

    let id = storage.insert(&slug, record).await.map_err(internal)?;
    info!(
        "get submit request: quiz: {}, id: {}, unanswered: {}",
        slug, id, unanswered
    );
    Ok(warp::reply::json(&SubmitResponse { id }))
}

async fn handle_compare_all(
    slug: String,
    id: u64,
    query: DetailQuery,
    loader: QuizLoader,
    engine: Arc<ComparisonEngine<Storage>>,
) -> Result<impl Reply, Rejection> {
    ensure_quiz(&loader, &slug).await?;
    let results = engine
        .compare_all(&slug, id, DetailMode::from_expanded(query.expanded))
        .await
        .map_err(internal)?
        .ok_or_else(not_found)?;
    let undefined = results
        .iter()
        .filter(|r| r.similarity.is_undefined())
        .count();
    info!(
        "get results request: quiz: {}, id: {}, compared: {}, undefined: {}",
        slug,
        id,
        results.len(),
        undefined
    );
    Ok(warp::reply::json(&results))
}

async fn handle_compare_two(
    slug: String,
    id: u64,
    other_id: u64,
    query: DetailQuery,
    loader: QuizLoader,
    engine: Arc<ComparisonEngine<Storage>>,
) -> Result<impl Reply, Rejection> {
    ensure_quiz(&loader, &slug).await?;
    let result = engine
        .compare_two(&slug, id, other_id, DetailMode::from_expanded(query.expanded))
        .await
        .map_err(internal)?
        .ok_or_else(not_found)?;
    info!(
        "get compare request: quiz: {}, id: {}, other_id: {}, similarity: {}",
        slug, id, other_id, result.similarity
    );
    Ok(warp::reply::json(&result))
}

async fn ensure_quiz(loader: &QuizLoader, slug: &str) -> Result<(), Rejection> {
    match loader.find_quiz(slug).await.map_err(internal)? {
        Some(_) => Ok(()),
        None => Err(not_found()),
    }
}

fn not_found() -> Rejection {
    warp::reject::custom(NotFound)
}

fn internal(e: anyhow::Error) -> Rejection {
    error!("request failed: {:#}", e);
    warp::reject::custom(InternalError(e.to_string()))
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.find::<NotFound>().is_some() || err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(InternalError(message)) = err.find::<InternalError>() {
        (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "submission too large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        warn!("unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "unhandled rejection".to_string(),
        )
    };

    let json = warp::reply::json(&ErrorMessage {
        code: code.as_u16(),
        message,
    });
    Ok(warp::reply::with_status(json, code))
}
