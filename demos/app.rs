//! Demo application: route files under `demos/routes`, compiled in.

use fsroute::module::Manifest;

#[path = "routes/route.rs"]
mod home;
#[path = "routes/users/route.rs"]
mod users;
#[path = "routes/users/[id]/route.rs"]
mod user;
#[path = "routes/session/route.rs"]
mod session;
#[path = "routes/assets/[...file]/route.rs"]
mod assets;
#[path = "middlewares/index.rs"]
mod middlewares;

pub fn manifest() -> Manifest {
    Manifest::new()
        .module("route.rs", home::module)
        .module("users/route.rs", users::module)
        .module("users/[id]/route.rs", user::module)
        .module("session/route.rs", session::module)
        .module("assets/[...file]/route.rs", assets::module)
        .middleware("middlewares/index.rs", middlewares::declaration())
}
