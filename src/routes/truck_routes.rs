use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};

use crate::controllers::truck_controller::TruckController;
use crate::dto::truck_dto::{CreateTruckRequest, MessageResponse, UpdateTruckRequest};
use crate::models::Truck;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_truck_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_trucks).post(create_truck))
        .route("/available/:date", get(available_trucks))
        .route("/:id", get(get_truck).put(update_truck).delete(delete_truck))
        .route("/:id/busy/:date", put(mark_busy).delete(clear_busy))
}

fn controller(state: &AppState) -> TruckController {
    TruckController::new(state.repository.clone())
}

async fn create_truck(
    State(state): State<AppState>,
    payload: Result<Json<CreateTruckRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Truck>), AppError> {
    let Json(request) = payload?;
    let truck = controller(&state).create(request).await?;
    Ok((StatusCode::CREATED, Json(truck)))
}

async fn list_trucks(State(state): State<AppState>) -> Result<Json<Vec<Truck>>, AppError> {
    Ok(Json(controller(&state).list().await?))
}

async fn get_truck(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Truck>, AppError> {
    Ok(Json(controller(&state).get(&id).await?))
}

async fn update_truck(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTruckRequest>, JsonRejection>,
) -> Result<Json<Truck>, AppError> {
    let Json(request) = payload?;
    Ok(Json(controller(&state).update(&id, request).await?))
}

async fn delete_truck(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    controller(&state).delete(&id).await?;
    Ok(Json(MessageResponse::new(format!(
        "Truck with ID {} successfully deleted",
        id
    ))))
}

async fn available_trucks(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<Vec<Truck>>, AppError> {
    Ok(Json(controller(&state).available_on(&date).await?))
}

async fn mark_busy(
    State(state): State<AppState>,
    Path((id, date)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, AppError> {
    controller(&state).mark_busy(&id, &date).await?;
    Ok(Json(MessageResponse::new(format!(
        "Truck {} marked busy on {}",
        id, date
    ))))
}

async fn clear_busy(
    State(state): State<AppState>,
    Path((id, date)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, AppError> {
    controller(&state).clear_busy(&id, &date).await?;
    Ok(Json(MessageResponse::new(format!(
        "Truck {} is no longer busy on {}",
        id, date
    ))))
}
