use crate::models::AuditReport;
use crate::services::AuditService;
use actix_web::{HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/audit",
    tag = "lottery",
    responses(
        (status = 200, description = "一致性审计结果", body = AuditReport),
        (status = 500, description = "INTERNAL_ERROR", body = String, content_type = "text/plain")
    )
)]
/// 检查计数器 / 已激活兑换码 / 中奖次数 之间的一致性
pub async fn get_audit(service: web::Data<AuditService>) -> Result<HttpResponse> {
    match service.audit().await {
        Ok(report) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": report }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn audit_config(cfg: &mut web::ServiceConfig) {
    cfg.route("/audit", web::get().to(get_audit));
}
