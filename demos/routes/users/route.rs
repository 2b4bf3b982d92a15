use axum::http::StatusCode;
use fsroute::http::{HttpError, Reply, RequestContext};
use fsroute::module::RouteModule;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

pub fn module() -> anyhow::Result<RouteModule> {
    Ok(RouteModule::new()
        .get(|req: RequestContext| async move {
            let limit: usize = req.query_param("limit").and_then(|l| l.parse().ok()).unwrap_or(10);
            let users: Vec<_> = (1..=limit.min(3)).map(|id| json!({ "id": id })).collect();
            Ok(Reply::json(users))
        })
        .post(|req: RequestContext| async move {
            let user: NewUser = req
                .json()
                .map_err(|e| HttpError::bad_request(format!("invalid user: {e}")))?;
            Ok(Reply::json(json!({ "name": user.name }))
                .status(StatusCode::CREATED)
                .header("location", "/users/4"))
        }))
}
