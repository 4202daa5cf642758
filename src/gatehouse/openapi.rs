use utoipa::OpenApi;

use super::handlers::{health, home, sessions, users, FormTarget};

pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";
pub const SWAGGER_PATH: &str = "/swagger-ui";

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        sessions::login_form,
        sessions::create,
        sessions::destroy,
        sessions::logout,
        users::signup_form,
        users::create,
        home::home,
    ),
    components(schemas(
        health::Health,
        FormTarget,
        sessions::LoginForm,
        users::SignupForm,
        home::Home,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "sessions", description = "Login and logout"),
        (name = "users", description = "Signup and the signed-in user"),
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
