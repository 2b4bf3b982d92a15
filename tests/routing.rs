mod common;

use axum::http::StatusCode;
use common::{send, RouteTree};
use fsroute::config::Mode;
use fsroute::http::{Reply, RequestContext, ResponseSink};
use fsroute::module::{Handler, Manifest, RouteModule};
use fsroute::routing::Naming;
use fsroute::App;
use serde_json::json;

fn basic_manifest() -> Manifest {
    Manifest::new()
        .module("route.rs", || Ok(RouteModule::new().get(|_req| async { Ok("ok") })))
        .module("count/route.rs", || Ok(RouteModule::new().get(|_req| async { Ok(7) })))
        .module("data/route.rs", || {
            Ok(RouteModule::new().get(|_req| async { Ok(json!({ "data": 42 })) }))
        })
        .module("users/[id]/route.rs", || {
            Ok(RouteModule::new().get(|req: RequestContext| async move {
                Ok(json!({ "id": req.param("id"), "q": req.query_param("q") }))
            }))
        })
}

#[tokio::test]
async fn test_return_values_become_responses() {
    let tree = RouteTree::new(&["route.rs", "count/route.rs", "data/route.rs", "users/[id]/route.rs"]);
    let app = App::builder(tree.config(Mode::Production))
        .manifest(basic_manifest())
        .build()
        .await
        .unwrap();
    let router = app.router();

    let reply = send(&router, "GET", "/", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "ok");

    let reply = send(&router, "GET", "/count", None).await;
    assert_eq!(reply.text(), "7");

    let reply = send(&router, "GET", "/data", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["content-type"], "application/json");
    assert_eq!(reply.json(), json!({ "data": 42 }));

    let reply = send(&router, "GET", "/users/12?q=x", None).await;
    assert_eq!(reply.json(), json!({ "id": "12", "q": "x" }));
}

#[tokio::test]
async fn test_unmatched_route_is_json_404() {
    let tree = RouteTree::new(&["route.rs"]);
    let app = App::builder(tree.config(Mode::Production))
        .manifest(basic_manifest())
        .build()
        .await
        .unwrap();

    let reply = send(&app.router(), "GET", "/missing/page?x=1", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json(), json!({ "error": "Not Found", "path": "/missing/page?x=1" }));
}

#[tokio::test]
async fn test_redirect_wins_over_other_directives() {
    let tree = RouteTree::new(&["login/route.rs"]);
    let manifest = Manifest::new().module("login/route.rs", || {
        Ok(RouteModule::new().get(|_req| async {
            Ok(json!({ "redirect": "/auth", "body": { "ignored": true }, "raw": "ignored" }))
        }))
    });
    let app = App::builder(tree.config(Mode::Production)).manifest(manifest).build().await.unwrap();

    let reply = send(&app.router(), "GET", "/login", None).await;
    assert_eq!(reply.status, StatusCode::FOUND);
    assert_eq!(reply.headers["location"], "/auth");
    assert!(reply.body.is_empty());
}

#[tokio::test]
async fn test_failing_module_is_isolated() {
    let tree = RouteTree::new(&["a/route.rs", "b/route.rs", "c/route.rs"]);
    let manifest = Manifest::new()
        .module("a/route.rs", || Ok(RouteModule::new().get(|_req| async { Ok("a") })))
        .module("b/route.rs", || Err(anyhow::anyhow!("b cannot start")))
        .module("c/route.rs", || Ok(RouteModule::new().get(|_req| async { Ok("c") })));
    let app = App::builder(tree.config(Mode::Production)).manifest(manifest).build().await.unwrap();

    let report = app.rebuild().await.unwrap();
    assert_eq!(report.registered(), 2);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].path().ends_with("b/route.rs"));

    let router = app.router();
    assert_eq!(send(&router, "GET", "/a", None).await.text(), "a");
    assert_eq!(send(&router, "GET", "/b", None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&router, "GET", "/c", None).await.text(), "c");
}

#[tokio::test]
async fn test_unregistered_file_contributes_nothing() {
    let tree = RouteTree::new(&["route.rs", "orphan/route.rs"]);
    let app = App::builder(tree.config(Mode::Production))
        .manifest(basic_manifest())
        .build()
        .await
        .unwrap();
    assert_eq!(send(&app.router(), "GET", "/orphan", None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&app.router(), "GET", "/", None).await.text(), "ok");
}

#[tokio::test]
async fn test_production_caches_modules_across_rebuilds() {
    let tree = RouteTree::new(&["route.rs", "count/route.rs"]);
    let app = App::builder(tree.config(Mode::Production))
        .manifest(basic_manifest())
        .build()
        .await
        .unwrap();
    assert_eq!(app.loader().evaluations(), 2);

    app.rebuild().await.unwrap();
    assert_eq!(app.loader().evaluations(), 2);
    assert_eq!(app.loader().cached(), 2);
}

#[tokio::test]
async fn test_development_reloads_and_picks_up_new_files() {
    let tree = RouteTree::new(&["route.rs"]);
    let app = App::builder(tree.config(Mode::Development))
        .manifest(basic_manifest())
        .build()
        .await
        .unwrap();
    assert_eq!(app.loader().evaluations(), 1);
    assert_eq!(send(&app.router(), "GET", "/count", None).await.status, StatusCode::NOT_FOUND);

    tree.add("count/route.rs");
    app.rebuild().await.unwrap();
    assert_eq!(app.loader().evaluations(), 3);
    assert_eq!(send(&app.router(), "GET", "/count", None).await.text(), "7");
}

#[tokio::test]
async fn test_handler_that_sent_response_keeps_control() {
    let tree = RouteTree::new(&["manual/route.rs"]);
    let manifest = Manifest::new().module("manual/route.rs", || {
        Ok(RouteModule::new().default_handler(Handler::with_sink(
            |_req: RequestContext, sink: ResponseSink| async move {
                sink.set_status(StatusCode::ACCEPTED)?;
                sink.send_text("manual")?;
                Ok(Reply::json(json!({ "late": true })))
            },
        )))
    });
    let app = App::builder(tree.config(Mode::Production)).manifest(manifest).build().await.unwrap();

    let reply = send(&app.router(), "GET", "/manual", None).await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert_eq!(reply.text(), "manual");
}

#[tokio::test]
async fn test_method_named_files() {
    let tree = RouteTree::new(&["items/get.rs", "items/post.rs", "items/export.rs"]);
    let manifest = Manifest::new()
        .module("items/get.rs", || {
            Ok(RouteModule::new().default_handler(Handler::new(|_req| async { Ok("list") })))
        })
        .module("items/post.rs", || Ok(RouteModule::new().post(|_req| async { Ok("create") })))
        .module("items/export.rs", || {
            Ok(RouteModule::new().get(|_req| async { Ok("csv") }))
        });
    let mut config = tree.config(Mode::Production);
    config.routes.naming = Naming::MethodFiles;
    let app = App::builder(config).manifest(manifest).build().await.unwrap();
    let router = app.router();

    assert_eq!(send(&router, "GET", "/items", None).await.text(), "list");
    assert_eq!(send(&router, "POST", "/items", None).await.text(), "create");
    assert_eq!(send(&router, "GET", "/items/export", None).await.text(), "csv");
    assert_eq!(send(&router, "DELETE", "/items", None).await.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_base_route_prefixes_everything() {
    let tree = RouteTree::new(&["route.rs", "users/[id]/route.rs"]);
    let mut config = tree.config(Mode::Production);
    config.routes.base_route = "/api/v1".into();
    let app = App::builder(config).manifest(basic_manifest()).build().await.unwrap();
    let router = app.router();

    assert_eq!(send(&router, "GET", "/api/v1", None).await.text(), "ok");
    assert_eq!(send(&router, "GET", "/api/v1/users/3", None).await.json()["id"], "3");
    assert_eq!(send(&router, "GET", "/users/3", None).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_claims_keep_first_file() {
    let tree = RouteTree::new(&["a/[id]/route.rs", "a/[key]/route.rs"]);
    let manifest = Manifest::new()
        .module("a/[id]/route.rs", || Ok(RouteModule::new().get(|_req| async { Ok("by id") })))
        .module("a/[key]/route.rs", || {
            Ok(RouteModule::new()
                .get(|_req| async { Ok("by key") })
                .post(|req: RequestContext| async move { Ok(format!("posted {}", req.param("key").unwrap_or("?"))) }))
        });
    let app = App::builder(tree.config(Mode::Production)).manifest(manifest).build().await.unwrap();

    let report = app.rebuild().await.unwrap();
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].winner, "a/[id]/route.rs");

    let router = app.router();
    assert_eq!(send(&router, "GET", "/a/5", None).await.text(), "by id");
    assert_eq!(send(&router, "POST", "/a/5", None).await.text(), "posted 5");
}

#[tokio::test]
async fn test_handler_errors_use_error_handler() {
    let tree = RouteTree::new(&["boom/route.rs"]);
    let manifest = Manifest::new().module("boom/route.rs", || {
        Ok(RouteModule::new()
            .get(|_req| async { Err::<(), _>(anyhow::anyhow!("secret failure")) })
            .post(|_req| async { Err::<(), _>(fsroute::http::HttpError::bad_request("missing name").into()) }))
    });

    let prod = App::builder(tree.config(Mode::Production))
        .manifest(manifest.clone())
        .build()
        .await
        .unwrap();
    let reply = send(&prod.router(), "GET", "/boom", None).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.json(), json!({ "error": "Internal Server Error" }));
    let reply = send(&prod.router(), "POST", "/boom", None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let dev = App::builder(tree.config(Mode::Development)).manifest(manifest).build().await.unwrap();
    let reply = send(&dev.router(), "GET", "/boom", None).await;
    assert_eq!(reply.json()["detail"], "secret failure");
}

#[tokio::test]
async fn test_development_panic_reports_location() {
    let tree = RouteTree::new(&["crash/route.rs"]);
    let manifest = Manifest::new().module("crash/route.rs", || {
        Ok(RouteModule::new().get(|_req| async {
            let slots: Vec<u32> = Vec::new();
            if slots.is_empty() {
                panic!("no slots left");
            }
            Ok(slots[0])
        }))
    });

    let dev = App::builder(tree.config(Mode::Development))
        .manifest(manifest.clone())
        .build()
        .await
        .unwrap();
    let reply = send(&dev.router(), "GET", "/crash", None).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = reply.json();
    assert_eq!(body["detail"], "handler panicked: no slots left");
    assert!(body["location"].as_str().unwrap().contains("routing.rs"), "{body}");

    let prod = App::builder(tree.config(Mode::Production)).manifest(manifest).build().await.unwrap();
    let reply = send(&prod.router(), "GET", "/crash", None).await;
    assert_eq!(reply.json(), json!({ "error": "Internal Server Error" }));
}
