use fsroute::http::{CookieOptions, Reply, RequestContext, SameSitePolicy};
use fsroute::module::RouteModule;
use serde_json::json;

pub fn module() -> anyhow::Result<RouteModule> {
    Ok(RouteModule::new()
        .get(|req: RequestContext| async move {
            match req.cookies().get("session") {
                Some(id) => Ok(Reply::json(json!({ "session": id }))),
                None => Ok(Reply::redirect_to("/")),
            }
        })
        .post(|_req| async {
            let options = CookieOptions {
                path: Some("/".into()),
                http_only: true,
                same_site: Some(SameSitePolicy::Lax),
                max_age: Some(3600),
                ..Default::default()
            };
            Ok(Reply::json(json!({ "ok": true })).cookie("session", uuid::Uuid::new_v4().to_string(), options))
        })
        .delete(|req: RequestContext| async move {
            req.cookies().remove("session", Some("/"));
            Ok(Reply::redirect_to("/"))
        }))
}
