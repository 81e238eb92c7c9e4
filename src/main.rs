use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::Context;
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter

use lottery_backend::{
    config::Config,
    database::create_store,
    handlers,
    middlewares::create_cors,
    services::{AuditService, LotteryRules, RedemptionService},
    swagger::swagger_config,
    tasks,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml().context("Failed to load configuration")?;

    // 创建存储（database 后端会自动运行迁移）
    let store = create_store(&config.database)
        .await
        .context("Failed to initialize storage")?;

    let rules = LotteryRules::from(&config.lottery);
    log::info!(
        "Lottery rules: prize every {} activations, at most {} wins per user",
        rules.prize_interval,
        rules.wins_limit
    );

    // 创建服务
    let redemption_service = RedemptionService::new(store.clone(), rules);
    let audit_service = AuditService::new(store, rules);

    // 启动后台任务
    tasks::spawn_all(audit_service.clone(), config.lottery.audit_interval_secs);

    // 启动HTTP服务器
    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(create_cors())
            .app_data(web::Data::new(redemption_service.clone()))
            .app_data(web::Data::new(audit_service.clone()))
            .configure(swagger_config)
            .configure(handlers::redeem_config)
            .configure(handlers::audit_config)
            .default_service(web::route().to(handlers::not_found))
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
