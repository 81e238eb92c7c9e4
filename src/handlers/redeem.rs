use crate::models::*;
use crate::services::RedemptionService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use std::collections::HashMap;

#[utoipa::path(
    get,
    path = "/",
    tag = "lottery",
    params(RedeemQuery),
    responses(
        (status = 200, description = "兑换结果: CODE_SUCCESS / CODE_PRIZE / CODE_REPEAT / WINS_LIMIT_EXCEEDED / CODE_WRONG", body = String, content_type = "text/plain"),
        (status = 500, description = "INTERNAL_ERROR", body = String, content_type = "text/plain")
    )
)]
/// 兑换一个兑换码
/// query 必须且只能包含 user 和 code，否则返回 CODE_WRONG
pub async fn redeem(
    service: web::Data<RedemptionService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let query = web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .ok()
        .and_then(|params| RedeemQuery::from_params(params.into_inner()));

    let Some(query) = query else {
        return Ok(outcome_response(RedeemOutcome::Wrong));
    };

    match service.redeem(&query.user, &query.code).await {
        Ok(outcome) => Ok(outcome_response(outcome)),
        Err(e) => Ok(e.error_response()),
    }
}

fn outcome_response(outcome: RedeemOutcome) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(outcome.as_str())
}

/// 路由配置
pub fn redeem_config(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(redeem));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::not_found;
    use crate::services::LotteryRules;
    use crate::store::MemoryStore;
    use crate::store::testing::RecordingStore;
    use actix_web::{App, http::StatusCode, test};
    use std::sync::Arc;
    use std::time::Duration;

    fn service(store: impl crate::store::LotteryStore + 'static) -> RedemptionService {
        RedemptionService::new(Arc::new(store), LotteryRules::default())
    }

    // 请求并返回 (status, body)
    macro_rules! get {
        ($app:expr, $uri:expr) => {{
            let req = test::TestRequest::get().uri($uri).to_request();
            let resp = test::call_service($app, req).await;
            let status = resp.status();
            let body = test::read_body(resp).await;
            (status, String::from_utf8(body.to_vec()).unwrap())
        }};
    }

    #[actix_web::test]
    async fn test_redeem_outcomes_over_http() {
        let svc = service(MemoryStore::seeded(Duration::from_secs(5)));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(svc))
                .configure(redeem_config)
                .default_service(web::route().to(not_found)),
        )
        .await;

        assert_eq!(
            get!(&app, "/?user=alice&code=AAAAA"),
            (StatusCode::OK, "CODE_SUCCESS".into())
        );
        assert_eq!(
            get!(&app, "/?code=AAAAA&user=bobby"),
            (StatusCode::OK, "CODE_REPEAT".into())
        );

        for n in 2..=9 {
            let uri = format!("/?user=alice&code=AAAA{n}");
            assert_eq!(get!(&app, &uri).1, "CODE_SUCCESS");
        }
        assert_eq!(get!(&app, "/?user=bobby&code=BBBBB").1, "CODE_PRIZE");
    }

    #[actix_web::test]
    async fn test_malformed_queries_are_wrong() {
        let store = RecordingStore::new(MemoryStore::seeded(Duration::from_secs(5)));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service(store.clone())))
                .configure(redeem_config),
        )
        .await;

        for uri in [
            "/",
            "/?user=alice",
            "/?code=AAAAA",
            "/?user=ab&code=AAAAA",
            "/?user=alice&code=AAAAAA",
            "/?user=alice&code=AAAAA&extra=1",
            "/?user=al%20ce&code=AAAAA",
            "/?user=alice&code=%ZZ",
        ] {
            assert_eq!(
                get!(&app, uri),
                (StatusCode::OK, "CODE_WRONG".into()),
                "{uri}"
            );
        }
        assert!(store.calls().is_empty());
    }

    #[actix_web::test]
    async fn test_store_failure_is_internal_error() {
        let store =
            RecordingStore::new(MemoryStore::seeded(Duration::from_secs(5))).failing_on("lock_counter");
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service(store)))
                .configure(redeem_config),
        )
        .await;

        assert_eq!(
            get!(&app, "/?user=alice&code=AAAAA"),
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR".into())
        );
    }

    #[actix_web::test]
    async fn test_unknown_route_is_not_found() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service(MemoryStore::seeded(Duration::from_secs(5)))))
                .configure(redeem_config)
                .default_service(web::route().to(not_found)),
        )
        .await;

        assert_eq!(
            get!(&app, "/nope?user=alice&code=AAAAA"),
            (StatusCode::NOT_FOUND, "NOT_FOUND".into())
        );
    }
}
