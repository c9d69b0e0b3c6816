use salvo::prelude::*;
use serde_json::json;

#[handler]
pub async fn root(res: &mut Response) {
    res.render(Json(json!({ "message": "OLX Database API is running" })));
}

#[handler]
pub async fn health_check(res: &mut Response) {
    res.render(Json(json!({
        "status": "healthy",
        "service": "olx-database-api",
    })));
}
