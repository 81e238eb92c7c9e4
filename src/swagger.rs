use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use crate::models::*;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::redeem::redeem, handlers::audit::get_audit),
    components(schemas(RedeemOutcome, AuditReport)),
    tags(
        (name = "lottery", description = "Promo code redemption API"),
    ),
    info(
        title = "Lottery Backend API",
        version = "1.0.0",
        description = "Promo code redemption with a prize on every N-th activation"
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
