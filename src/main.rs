use rusty_sales::config::ServiceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = ServiceConfig::from_env();
    log::debug!("{config:?}");

    rusty_sales::app::run(config).await
}
