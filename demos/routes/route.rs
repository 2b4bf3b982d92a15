use fsroute::module::RouteModule;
use serde_json::json;

pub fn module() -> anyhow::Result<RouteModule> {
    Ok(RouteModule::new().get(|_req| async {
        Ok(json!({ "name": "fsroute", "status": "running" }))
    }))
}
